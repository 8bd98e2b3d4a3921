//! Request hook chains: filters around the whole request, interceptors
//! around the business handler.

pub mod definitions;
pub mod filter;
mod guard;
pub mod interceptor;

pub use definitions::{
    Completion, HookError, Outcome, Rejection, RequestContext, Stage, Verdict,
};
pub use filter::{FilterChain, FilterNext, RequestFilter};
pub use interceptor::{InterceptorChain, RequestInterceptor};
