pub mod clients;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod origination;
pub mod payments;
pub mod service;
pub mod state;
pub mod store;
pub mod types;
pub mod views;

// re-export key types
pub use clients::{ClientPatch, ClientRegistry, NewClient};
pub use config::{LedgerConfig, LoanLimits, ScheduleConfig, StorageConfig};
pub use decimal::{Money, Rate};
pub use errors::{LedgerError, Result};
pub use origination::{LoanApplication, LoanApplicationBuilder};
pub use payments::{AmortizationCalculator, LoanQuote, PaymentRequest, PaymentSummary};
pub use service::{InstallmentPatch, LoanService};
pub use state::{Client, Installment, Loan};
pub use store::{LedgerStore, MemoryStore, SqliteStore};
pub use types::{
    ClientFilter, ClientId, InstallmentFilter, InstallmentId, InstallmentStatus, LoanFilter, LoanId,
    LoanStatus, Page,
};
pub use views::{BalanceCheck, BalanceView, ClientWithLoans, LoanDetail};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
