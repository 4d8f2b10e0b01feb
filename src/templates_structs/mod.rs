// Response and template structures, organized by channel.
// All types are re-exported: `use brgy_events::templates_structs::*`

pub mod api;
pub mod email;

pub use api::*;
pub use email::*;
