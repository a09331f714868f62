/// sqlite store - the same engine against a database file
///
/// set LEDGER_DATABASE_URL to choose the file, e.g.
/// `LEDGER_DATABASE_URL=sqlite://ledger.db cargo run --example 02_sqlite_store`
use microloan_ledger::{
    ClientFilter, ClientRegistry, LedgerConfig, LoanApplication, LoanService, Money, NewClient, Rate,
    SafeTimeProvider, SqliteStore, StorageConfig, TimeSource,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = LedgerConfig::from_env()?;
    if config.storage == StorageConfig::Memory {
        let path = std::env::temp_dir().join("microloan-ledger-demo.db");
        config = config.with_sqlite(path);
    }
    println!("{}", config.to_json_pretty()?);

    let mut store = SqliteStore::from_config(&config)?;
    let service = LoanService::new(config)?;
    let registry = ClientRegistry::from_config(service.config());
    let time = SafeTimeProvider::new(TimeSource::System);

    // reuse the demo client across runs
    let existing = registry
        .list(&store, ClientFilter { active: Some(true) }, None)?
        .into_iter()
        .find(|c| c.document_id == "V-20000001");
    let client = match existing {
        Some(client) => client,
        None => registry.register(
            &mut store,
            &time,
            NewClient {
                first_name: "Carla".to_string(),
                last_name: "Ruiz".to_string(),
                email: "carla@example.com".to_string(),
                phone: "555-0120".to_string(),
                address: "Plaza Mayor 3".to_string(),
                document_id: "V-20000001".to_string(),
            },
        )?,
    };

    let detail = service.create_loan(
        &mut store,
        &time,
        LoanApplication::new(client.id, Money::from_major(1_200), Rate::from_percentage(20), 6),
    )?;
    service.apply_payment(&mut store, &time, detail.loan.id, 1, detail.loan.monthly_payment)?;

    let view = service.balance_view(&store, detail.loan.id)?;
    println!("loan {}: paid {} of {}, balance {}", view.loan_id, view.total_paid, view.original_amount, view.balance);

    let portfolio = registry.client_with_loans(&store, client.id)?;
    println!("{} holds {} loans, outstanding {}", portfolio.client.full_name(), portfolio.loans.len(), portfolio.outstanding());

    Ok(())
}
