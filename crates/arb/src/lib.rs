pub mod detector;
pub mod publish;
pub mod stage;

pub use detector::{Detector, DetectorParams};
pub use publish::{get_current_opportunities, opportunity_key, should_overwrite};
pub use stage::ArbStage;
