pub mod builder;
pub mod error;
pub mod metrics;
pub mod report;
pub mod savings;
pub mod trace;

pub use builder::build_dependency_graph;
pub use error::{CoreError, Result};
pub use metrics::{
    estimate_metrics, FirstContentfulPaint, Interactive, LargestContentfulPaint, Metric,
    MetricEstimate,
};
pub use savings::{estimate_savings, Savings, Scenario};
pub use trace::{load_page_trace, MetricTimestamps, PageTrace, TraceTask};

use colored::Colorize;

pub fn print_banner() {
    let banner = r#"
  ██╗      █████╗ ███╗   ██╗████████╗███████╗██████╗ ███╗   ██╗
  ██║     ██╔══██╗████╗  ██║╚══██╔══╝██╔════╝██╔══██╗████╗  ██║
  ██║     ███████║██╔██╗ ██║   ██║   █████╗  ██████╔╝██╔██╗ ██║
  ██║     ██╔══██║██║╚██╗██║   ██║   ██╔══╝  ██╔══██╗██║╚██╗██║
  ███████╗██║  ██║██║ ╚████║   ██║   ███████╗██║  ██║██║ ╚████║
  ╚══════╝╚═╝  ╚═╝╚═╝  ╚═══╝   ╚═╝   ╚══════╝╚═╝  ╚═╝╚═╝  ╚═══╝"#;
    eprintln!("{}", banner.bright_yellow().bold());
    eprintln!(
        "  {} {}\n",
        "page load simulator".bright_black(),
        env!("CARGO_PKG_VERSION").bright_black()
    );
}
