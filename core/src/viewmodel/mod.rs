//! Screen-facing view models.
//!
//! Each view model owns one `StateSlot` per logical operation and a
//! `TaskScope` for the work it launches. Trigger methods (`load`, `create`,
//! ...) publish `Loading` before returning and finish in a spawned task, so
//! they must be called from inside a Tokio runtime. The `*_now` variants run
//! the same operation inline and return its outcome.

mod auth;
mod checkout;
mod crud;

pub use auth::AuthViewModel;
pub use checkout::{Cart, CartLine, CheckoutViewModel};
pub use crud::{
    AppointmentsViewModel, ClinicsViewModel, CrudViewModel, PetsViewModel, ProductsViewModel,
};
