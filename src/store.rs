use crate::{
    error::Result,
    models::{Link, LinkStatus},
};
use async_trait::async_trait;

/// Storage contract for links.
///
/// Implementations keep the primary `short_id -> Link` mapping and the
/// per-owner index consistent: `store` and `delete` must update both as a
/// single atomic step with respect to every other call on the same store.
#[async_trait]
pub trait LinkStore: Send + Sync + 'static {
    /// Cheap pre-check used by id generation. Not authoritative; `store` is.
    async fn exists(&self, short_id: &str) -> Result<bool>;

    /// Insert a new link. Fails with `AlreadyExists` if the id is taken.
    async fn store(&self, link: Link) -> Result<Link>;

    /// Fetch a link. Fails with `NotFound`.
    async fn get(&self, short_id: &str) -> Result<Link>;

    /// Remove a link on behalf of `owner_id`.
    ///
    /// Fails with `NotFound` if absent and `AccessDenied` if the link is
    /// anonymous or belongs to another account.
    async fn delete(&self, short_id: &str, owner_id: &str) -> Result<()>;

    /// All links of one account; empty when it has none.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Link>>;

    /// Overwrite the status of a link. Writing the current value is a no-op.
    async fn update_status(&self, short_id: &str, status: LinkStatus) -> Result<()>;

    /// Every stored link, for the health checker.
    async fn list_all(&self) -> Result<Vec<Link>>;
}
