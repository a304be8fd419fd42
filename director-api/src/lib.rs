pub mod api_docs;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod graphql;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use executor::{start_executor_task, Executor};
pub use routes::create_app;
pub use state::AppState;
