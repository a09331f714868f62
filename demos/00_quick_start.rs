/// quick start - quote a loan, open it and pay the first installment
use microloan_ledger::{
    ClientRegistry, LedgerConfig, LoanApplication, LoanService, MemoryStore, Money, NewClient, Rate,
    SafeTimeProvider, TimeSource,
};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let time = SafeTimeProvider::new(TimeSource::System);
    let mut store = MemoryStore::new();
    let service = LoanService::new(LedgerConfig::microcredit())?;

    // price a $5,000 loan at 12.5% over 12 months
    let quote = service.compute_schedule(Money::from_major(5_000), Rate::from_percent(dec!(12.5)), 12)?;
    println!("monthly payment: {}", quote.monthly_payment);
    println!("total interest:  {}", quote.total_interest);

    let client = ClientRegistry::new().register(
        &mut store,
        &time,
        NewClient {
            first_name: "Ana".to_string(),
            last_name: "Pérez".to_string(),
            email: "ana@example.com".to_string(),
            phone: "555-0101".to_string(),
            address: "Av. Bolívar 10".to_string(),
            document_id: "V-12345678".to_string(),
        },
    )?;

    let detail = service.create_loan(
        &mut store,
        &time,
        LoanApplication::new(client.id, quote.principal, quote.annual_rate, quote.term_months),
    )?;

    // make a payment
    service.apply_payment(&mut store, &time, detail.loan.id, 1, detail.loan.monthly_payment)?;

    // print current state
    println!("{}", service.loan_detail(&store, detail.loan.id)?.to_json_pretty()?);

    Ok(())
}
