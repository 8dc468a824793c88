/// Running mean of a scalar stream (training loss, validation loss, step time).
///
/// Every `update` records exactly one observation. The average of an empty
/// meter is `0.0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AverageMeter {
    sum: f64,
    count: u64,
}

impl AverageMeter {
    pub fn new() -> AverageMeter {
        AverageMeter::default()
    }

    pub fn update(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn reset(&mut self) {
        *self = AverageMeter::default();
    }
}
