mod middleware;
mod public;

pub use middleware::{RequestContext, log_responses, set_request_context};
pub use public::{HttpState, build_router};
