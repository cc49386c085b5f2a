//! The Customer service: model, storage, and HTTP routes.
//!
//! | Route | Result |
//! |---|---|
//! | `GET /customers` | JSON array of every customer, streamed |
//! | `GET /customers/{id}` | the customer, or 404 |
//! | `POST /customers` | `{"name": …}` → 201 with `location` |
//! | `DELETE /customers/{id}` | 204, or 404 |
//! | `GET /cwc/{id}` | `"{name} : {fact}"`, customer then fact |
//! | `GET /cwc/p/{id}` | the same, both fetched concurrently |

use serde::{Deserialize, Serialize};

mod repository;
mod routes;

pub use repository::{CustomerRepository, InMemoryCustomerRepository};
pub use routes::{AppState, routes};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// `None` until the repository has stored it.
    pub id: Option<i32>,
    pub name: String,
}

/// Body of `POST /customers`.
#[derive(Debug, Deserialize)]
pub struct NewCustomer {
    pub name: String,
}
