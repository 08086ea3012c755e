//! Login, protected layout, order list and their text rendering.

pub mod layout;
pub mod login;
pub mod order_list;
pub mod render;

pub use layout::*;
pub use login::*;
pub use order_list::*;
