pub mod client;
pub mod error;
pub mod list;
pub mod middleware;
pub mod refresh;
pub mod session;
pub mod storage;

pub use client::ApiClient;
pub use error::ApiClientError;
pub use list::ListController;
pub use middleware::RequestOptions;
pub use propdesk_api;
pub use refresh::HttpRefresher;
pub use session::{LoginRedirect, RefreshError, Session, SessionOptions, TokenRefresher};
pub use storage::{MemoryStorage, SessionStorage, StorageError, TokenStore};
