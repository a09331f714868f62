use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::errors::{LedgerError, Result};
use crate::state::Client;
use crate::store::LedgerStore;
use crate::types::{ClientFilter, ClientId, LoanFilter, Page};
use crate::views::ClientWithLoans;

/// registration data for a new client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewClient {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub document_id: String,
}

impl NewClient {
    pub fn validate(&self) -> Result<()> {
        require("first_name", &self.first_name)?;
        require("last_name", &self.last_name)?;
        require("phone", &self.phone)?;
        require("address", &self.address)?;
        require("document_id", &self.document_id)?;
        validate_email(&self.email)
    }
}

/// partial update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub active: Option<bool>,
}

impl ClientPatch {
    fn apply(self, client: &mut Client) -> Result<()> {
        if let Some(first_name) = self.first_name {
            require("first_name", &first_name)?;
            client.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            require("last_name", &last_name)?;
            client.last_name = last_name;
        }
        if let Some(email) = self.email {
            validate_email(&email)?;
            client.email = email;
        }
        if let Some(phone) = self.phone {
            require("phone", &phone)?;
            client.phone = phone;
        }
        if let Some(address) = self.address {
            require("address", &address)?;
            client.address = address;
        }
        if let Some(active) = self.active {
            client.active = active;
        }
        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::InvalidClient {
            message: format!("{} must not be empty", field),
        });
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if !valid {
        return Err(LedgerError::InvalidClient {
            message: format!("invalid email address: {:?}", email),
        });
    }
    Ok(())
}

/// client registry
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientRegistry {
    default_page: Page,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self {
            default_page: config.default_page(),
        }
    }

    pub fn register<S: LedgerStore>(
        &self,
        store: &mut S,
        time_provider: &SafeTimeProvider,
        new_client: NewClient,
    ) -> Result<Client> {
        new_client.validate()?;

        let client = Client {
            id: Uuid::new_v4(),
            first_name: new_client.first_name,
            last_name: new_client.last_name,
            email: new_client.email,
            phone: new_client.phone,
            address: new_client.address,
            document_id: new_client.document_id,
            registered_at: time_provider.now(),
            active: true,
        };

        store.insert_client(&client)?;
        info!(client_id = %client.id, "client registered");
        Ok(client)
    }

    pub fn get<S: LedgerStore>(&self, store: &S, id: ClientId) -> Result<Client> {
        store.get_client(id)?.ok_or(LedgerError::ClientNotFound { id })
    }

    /// `None` takes the registry's default page
    pub fn list<S: LedgerStore>(&self, store: &S, filter: ClientFilter, page: Option<Page>) -> Result<Vec<Client>> {
        let clients = store.list_clients(filter, page.unwrap_or(self.default_page))?;
        debug!(count = clients.len(), "listed clients");
        Ok(clients)
    }

    pub fn update<S: LedgerStore>(&self, store: &mut S, id: ClientId, patch: ClientPatch) -> Result<Client> {
        store.transaction(|tx| {
            let mut client = tx.get_client(id)?.ok_or(LedgerError::ClientNotFound { id })?;
            patch.apply(&mut client)?;
            tx.update_client(&client)?;
            info!(client_id = %id, active = client.active, "client updated");
            Ok(client)
        })
    }

    /// soft delete: the client stays on file but can no longer borrow
    pub fn deactivate<S: LedgerStore>(&self, store: &mut S, id: ClientId) -> Result<Client> {
        self.update(
            store,
            id,
            ClientPatch {
                active: Some(false),
                ..ClientPatch::default()
            },
        )
    }

    pub fn client_with_loans<S: LedgerStore>(&self, store: &S, id: ClientId) -> Result<ClientWithLoans> {
        let client = self.get(store, id)?;
        let loans = store.list_loans(
            LoanFilter {
                status: None,
                client_id: Some(id),
            },
            Page::all(),
        )?;
        Ok(ClientWithLoans { client, loans })
    }
}
