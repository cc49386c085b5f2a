use std::sync::Arc;

use http::StatusCode;
use tracing::debug;

use super::{Customer, CustomerRepository, NewCustomer};
use crate::catfact::FactClient;
use crate::error::Error;
use crate::{Request, Response, Router, with_state};

/// What every customer handler shares.
pub struct AppState<R> {
    pub customers: R,
    pub facts: FactClient,
}

/// Registers the customer routes on a fresh [`Router`].
pub fn routes<R: CustomerRepository>(state: Arc<AppState<R>>) -> Router {
    Router::new()
        .get("/customers", with_state(&state, list::<R>))
        .post("/customers", with_state(&state, create::<R>))
        .get("/customers/{id}", with_state(&state, show::<R>))
        .delete("/customers/{id}", with_state(&state, remove::<R>))
        .get("/cwc/{id}", with_state(&state, with_fact::<R>))
        .get("/cwc/p/{id}", with_state(&state, with_fact_concurrent::<R>))
}

fn customer_id(req: &Request) -> Result<i32, Response> {
    req.param("id")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| {
            Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .text("customer id must be an integer")
        })
}

async fn list<R: CustomerRepository>(state: Arc<AppState<R>>, _req: Request) -> Response {
    Response::json_array(state.customers.find_all())
}

async fn show<R: CustomerRepository>(state: Arc<AppState<R>>, req: Request) -> Result<Response, Error> {
    let id = match customer_id(&req) {
        Ok(id) => id,
        Err(res) => return Ok(res),
    };

    Ok(match state.customers.find_by_id(id).await? {
        Some(customer) => Response::json_value(&customer),
        None => Response::status(StatusCode::NOT_FOUND),
    })
}

async fn create<R: CustomerRepository>(state: Arc<AppState<R>>, req: Request) -> Result<Response, Error> {
    let input: NewCustomer = match req.json() {
        Ok(input) => input,
        Err(e) => {
            return Ok(Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .text(format!("invalid customer: {e}")));
        }
    };
    if input.name.trim().is_empty() {
        return Ok(Response::builder()
            .status(StatusCode::UNPROCESSABLE_ENTITY)
            .text("customer name must not be empty"));
    }

    let saved = state.customers.save(Customer { id: None, name: input.name }).await?;
    debug!(id = ?saved.id, "customer created");

    let builder = Response::builder().status(StatusCode::CREATED);
    let builder = match saved.id {
        Some(id) => builder.header("location", format!("/customers/{id}")),
        None => builder,
    };
    Ok(builder.json(serde_json::to_vec(&saved)?))
}

async fn remove<R: CustomerRepository>(state: Arc<AppState<R>>, req: Request) -> Result<Response, Error> {
    let id = match customer_id(&req) {
        Ok(id) => id,
        Err(res) => return Ok(res),
    };

    Ok(if state.customers.delete_by_id(id).await? {
        Response::status(StatusCode::NO_CONTENT)
    } else {
        Response::status(StatusCode::NOT_FOUND)
    })
}

/// Customer first, then a fact: two round trips, one after the other.
async fn with_fact<R: CustomerRepository>(state: Arc<AppState<R>>, req: Request) -> Result<Response, Error> {
    let id = match customer_id(&req) {
        Ok(id) => id,
        Err(res) => return Ok(res),
    };

    let Some(customer) = state.customers.find_by_id(id).await? else {
        return Ok(Response::status(StatusCode::NOT_FOUND));
    };
    let fact = state.facts.fetch().await?;
    Ok(Response::text(format!("{} : {}", customer.name, fact.fact)))
}

/// Same answer as [`with_fact`], with both lookups in flight at once.
async fn with_fact_concurrent<R: CustomerRepository>(
    state: Arc<AppState<R>>,
    req: Request,
) -> Result<Response, Error> {
    let id = match customer_id(&req) {
        Ok(id) => id,
        Err(res) => return Ok(res),
    };

    let (customer, fact) = tokio::try_join!(state.customers.find_by_id(id), state.facts.fetch())?;
    Ok(match customer {
        Some(customer) => Response::text(format!("{} : {}", customer.name, fact.fact)),
        None => Response::status(StatusCode::NOT_FOUND),
    })
}
