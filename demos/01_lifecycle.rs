/// lifecycle - a loan from origination through a missed installment to settlement
use chrono::{Duration, TimeZone, Utc};
use microloan_ledger::{
    ClientRegistry, LedgerConfig, LoanApplication, LoanService, MemoryStore, Money, NewClient, SafeTimeProvider,
    TimeSource,
};
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== loan lifecycle ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
    let controller = time.test_control().unwrap();

    let mut store = MemoryStore::new();
    let service = LoanService::new(LedgerConfig::microcredit())?;

    let client = ClientRegistry::new().register(
        &mut store,
        &time,
        NewClient {
            first_name: "Luis".to_string(),
            last_name: "Gómez".to_string(),
            email: "luis@example.com".to_string(),
            phone: "555-0110".to_string(),
            address: "Calle 5 #12".to_string(),
            document_id: "V-87654321".to_string(),
        },
    )?;

    // 1. origination
    println!("1. origination");
    println!("--------------");
    let application = LoanApplication::builder()
        .client(client.id)
        .amount(Money::from_major(3_000))
        .rate_percent(dec!(18))
        .term_months(3)
        .build()?;
    let detail = service.create_loan(&mut store, &time, application)?;
    let loan_id = detail.loan.id;

    println!("  date: {}", time.now().format("%Y-%m-%d"));
    println!("  monthly payment: {}", detail.loan.monthly_payment);
    for installment in &detail.installments {
        println!("    #{} due {}", installment.number, installment.due_date.format("%Y-%m-%d"));
    }

    // 2. on-time payment
    println!("\n2. on-time payment");
    println!("------------------");
    controller.advance(Duration::days(29));
    service.apply_payment(&mut store, &time, loan_id, 1, detail.loan.monthly_payment)?;
    println!("  date: {}", time.now().format("%Y-%m-%d"));
    println!("  balance: {}", service.get_loan(&store, loan_id)?.balance);
    println!("  status: {}", service.refresh_status(&mut store, &time, loan_id)?);

    // 3. missed installment
    println!("\n3. missed installment");
    println!("---------------------");
    controller.advance(Duration::days(35));
    println!("  date: {}", time.now().format("%Y-%m-%d"));
    println!("  status: {}", service.refresh_status(&mut store, &time, loan_id)?);

    let summary = service.payment_summary(&store, loan_id)?;
    println!("  paid: {}  pending: {}  overdue: {}", summary.paid_count, summary.pending_count, summary.overdue_count);

    // 4. catch up and settle
    println!("\n4. settlement");
    println!("-------------");
    service.apply_payment(&mut store, &time, loan_id, 2, detail.loan.monthly_payment)?;
    println!("  status after late payment: {}", service.refresh_status(&mut store, &time, loan_id)?);

    let remaining = service.get_loan(&store, loan_id)?.balance;
    service.apply_payment(&mut store, &time, loan_id, 3, remaining)?;

    let loan = service.get_loan(&store, loan_id)?;
    println!("  balance: {}", loan.balance);
    println!("  status: {}", loan.status);

    let check = service.reconcile_balance(&store, loan_id)?;
    println!("  recorded vs derived drift: {}", check.drift);

    Ok(())
}
