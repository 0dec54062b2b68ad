//! The storage client seam.
//!
//! A [`StorageClient`] speaks the model crate's request types. The
//! repository never interprets its errors; they reach the caller as
//! [`RepositoryError::Storage`](crate::RepositoryError::Storage).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dynarepo_model::input::{GetItemInput, PutItemInput, QueryInput, ScanInput};
use dynarepo_model::output::{GetItemOutput, PutItemOutput, QueryOutput, ScanOutput};

/// Boxed future returned by storage client methods.
pub type StoreFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Point reads, unconditional writes and paginated reads against a
/// partition/sort-key store.
pub trait StorageClient: Send + Sync + 'static {
    /// The client's own error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Insert or replace an item.
    fn put_item(&self, input: PutItemInput) -> StoreFuture<'_, PutItemOutput, Self::Error>;

    /// Read one item by primary key.
    fn get_item(&self, input: GetItemInput) -> StoreFuture<'_, GetItemOutput, Self::Error>;

    /// Fetch one page of a key-condition query.
    fn query(&self, input: QueryInput) -> StoreFuture<'_, QueryOutput, Self::Error>;

    /// Fetch one page of a scan.
    fn scan(&self, input: ScanInput) -> StoreFuture<'_, ScanOutput, Self::Error>;
}

impl<C: StorageClient> StorageClient for Arc<C> {
    type Error = C::Error;

    fn put_item(&self, input: PutItemInput) -> StoreFuture<'_, PutItemOutput, Self::Error> {
        self.as_ref().put_item(input)
    }

    fn get_item(&self, input: GetItemInput) -> StoreFuture<'_, GetItemOutput, Self::Error> {
        self.as_ref().get_item(input)
    }

    fn query(&self, input: QueryInput) -> StoreFuture<'_, QueryOutput, Self::Error> {
        self.as_ref().query(input)
    }

    fn scan(&self, input: ScanInput) -> StoreFuture<'_, ScanOutput, Self::Error> {
        self.as_ref().scan(input)
    }
}
