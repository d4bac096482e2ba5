pub mod auth;
pub mod diagnostics;
pub mod responses;
pub mod router;
pub mod state;
pub mod templates;

pub use responses::{ApiMessage, ApiResult, json_error};
pub use state::AppState;
pub use templates::{render_dashboard, render_editor, render_login_page};
