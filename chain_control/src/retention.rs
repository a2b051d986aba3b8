use log::debug;
use types::{config::ChainConfig, primitives::UnixSeconds};

/// Chooses how many applied blocks stay reversible.
/// A node replaying old blocks keeps a deeper undo history than a live one.
#[derive(Default, Debug)]
pub struct RetentionPolicy {
    catch_up_streak: u32,
}

impl RetentionPolicy {
    /// Records a block about to be applied and returns the undo depth to use for it.
    pub fn observe(
        &mut self,
        config: &ChainConfig,
        block_time: UnixSeconds,
        now: UnixSeconds,
    ) -> usize {
        if block_time < now.saturating_sub(config.catch_up_age) {
            self.catch_up_streak = self.catch_up_streak.saturating_add(1);

            if self.catch_up_streak >= config.catch_up_streak {
                if self.catch_up_streak == config.catch_up_streak {
                    debug!("catching up, keeping {} undo layers", config.catch_up_undo_depth);
                }

                return config.catch_up_undo_depth;
            }
        } else {
            self.catch_up_streak = 0;
        }

        config.live_undo_depth
    }
}
