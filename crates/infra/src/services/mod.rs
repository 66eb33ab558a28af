//! Use cases composed from the stores, cache, registry and token service.

pub mod roles;
pub mod session;
pub mod users;
pub mod views;

pub use roles::{NewRole, RolePatch, RoleService};
pub use session::{LoginInput, SessionService};
pub use users::{NewUser, UserPatch, UserService};
pub use views::{AuthOutput, ItemView, RoleView, UserView};
