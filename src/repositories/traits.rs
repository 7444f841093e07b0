//! Common repository traits.
//!
//! Conversations and messages are created through domain-specific
//! operations (`find_or_create_direct`, `append`), so only the generic
//! read seam is shared here.

/// Trait for reading a single entity by primary key.
///
/// # Type Parameters
/// * `Entity` - Type of the entity to read
/// * `Id` - Type of the primary key
pub trait Read<Entity, Id> {
    /// Reads an entity from the store by its primary key.
    ///
    /// # Returns
    /// * `Ok(Some(Entity))` - Entity found
    /// * `Ok(None)` - No entity with that id
    /// * `Err(sqlx::Error)` - Error during reading
    async fn read(&self, id: &Id) -> Result<Option<Entity>, sqlx::Error>;
}
