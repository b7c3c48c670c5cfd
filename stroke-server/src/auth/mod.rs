pub mod middleware;

pub use middleware::{
    AUTH_COOKIE, admin_middleware, auth_middleware, cookie_auth_middleware,
    optional_auth_middleware,
};
