// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

pub use handlers::{
    banner_enabled, format_live_status, format_records, load_source, parse_direction, parse_format,
    parse_scope, parse_view_mode, verbosity_level, write_output,
};
