/*!
 * Connect server API: wire types and the HTTP client
 */

pub mod client;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{ConnectApi, ConnectClient};
pub use types::{
    ContentItem, ContentRequest, Integration, ServerInfo, ServerSettings, TaskState, TaskStatus,
    User,
};
