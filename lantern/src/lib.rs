// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

pub use handlers::{
    build_simulator, load_settings, load_trace, parse_wasted_bytes, run_savings, run_simulations,
    scenarios_from_args,
};
