//! Customer storage.

use std::collections::BTreeMap;
use std::future::Future;
use std::ops::Bound;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tokio::sync::RwLock;

use super::Customer;
use crate::error::Error;

/// Persistence for [`Customer`]s, keyed by id.
pub trait CustomerRepository: Send + Sync + 'static {
    /// Every customer, in id order, produced lazily.
    fn find_all(&self) -> BoxStream<'static, Result<Customer, Error>>;

    fn find_by_id(&self, id: i32) -> impl Future<Output = Result<Option<Customer>, Error>> + Send;

    /// Inserts a customer without an id under the next free id, or replaces
    /// the one with the given id. Returns what was stored.
    fn save(&self, customer: Customer) -> impl Future<Output = Result<Customer, Error>> + Send;

    /// Returns whether a customer was removed.
    fn delete_by_id(&self, id: i32) -> impl Future<Output = Result<bool, Error>> + Send;

    fn count(&self) -> impl Future<Output = Result<usize, Error>> + Send;
}

/// A repository held in process memory. Clones share the same rows.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustomerRepository {
    rows: Arc<RwLock<BTreeMap<i32, Customer>>>,
}

impl InMemoryCustomerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the repository with one customer per name, ids starting at 1.
    pub fn with_customers<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rows = names.into_iter()
            .zip(1..)
            .map(|(name, id)| (id, Customer { id: Some(id), name: name.into() }))
            .collect();
        Self { rows: Arc::new(RwLock::new(rows)) }
    }
}

impl CustomerRepository for InMemoryCustomerRepository {
    fn find_all(&self) -> BoxStream<'static, Result<Customer, Error>> {
        // Walks the map one row per poll, like a cursor, instead of cloning
        // the whole table up front. Rows added behind the cursor are skipped.
        let rows = Arc::clone(&self.rows);
        stream::unfold(Bound::Unbounded, move |after| {
            let rows = Arc::clone(&rows);
            async move {
                let rows = rows.read().await;
                let (id, customer) = rows.range((after, Bound::Unbounded)).next()?;
                Some((Ok(customer.clone()), Bound::Excluded(*id)))
            }
        })
        .boxed()
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Customer>, Error> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn save(&self, customer: Customer) -> Result<Customer, Error> {
        let mut rows = self.rows.write().await;
        let id = match customer.id {
            Some(id) => id,
            None => match rows.last_key_value() {
                None => 1,
                Some((last, _)) => last.checked_add(1).ok_or(Error::IdsExhausted)?,
            },
        };
        let stored = Customer { id: Some(id), name: customer.name };
        rows.insert(id, stored.clone());
        Ok(stored)
    }

    async fn delete_by_id(&self, id: i32) -> Result<bool, Error> {
        Ok(self.rows.write().await.remove(&id).is_some())
    }

    async fn count(&self) -> Result<usize, Error> {
        Ok(self.rows.read().await.len())
    }
}
