pub mod average_meter;
pub mod running_score;
pub mod score_snapshot;

pub use average_meter::AverageMeter;
pub use running_score::RunningScore;
pub use score_snapshot::ScoreSnapshot;
