pub mod clipboard;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod handoff;
pub mod locator;
pub mod server;
pub mod session;
pub mod step;
pub mod wait;
pub mod workflow;

//  Re-export commonly used items
pub use config::{AutomationConfig, ConfigArgs, SessionConfig, TargetConfig, Timing};
pub use driver::{BrowserDriver, By, ChromeDriver, ChromeLauncher, Key, SessionFactory, WindowHandle};
pub use error::{AutomationError, Result};
pub use locator::{SelectorStrategy, StrategyChain};
pub use step::{StepDescriptor, StepOutcome, StepResult};
pub use wait::{Budget, Condition, WaitSpec};
pub use workflow::{Orchestrator, Payload, Stage, Workflow, WorkflowResult, WorkflowStatus};
