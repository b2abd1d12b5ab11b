/// Router Module Index
///
/// One router per access level. Every module applies its own layers, so a
/// handler can only become reachable through the gate of the file it is
/// registered in. All routers are merged under `/v1` by `create_router`.

/// Anonymous access: health, reads and the authentication flow.
pub mod public;

/// Requires an authenticated session with at least the `user` role.
pub mod authenticated;

/// Requires at least the `moderator` role.
pub mod moderator;

/// Requires the `admin` role.
pub mod admin;
