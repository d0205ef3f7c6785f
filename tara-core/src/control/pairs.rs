// tara-core/src/control/pairs.rs
//
// Several teleoperator/robot pairs teleoperated at once, each in its own
// task owning its devices.

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tara_common::traits::{Robot, Teleoperator};
use crate::control::teleop_loop::{teleop_loop, LoopOptions, LoopStats};
use crate::Error;

pub struct Pair {
    pub teleop: Box<dyn Teleoperator>,
    pub robot: Box<dyn Robot>,
}

/// Connects, teleoperates and disconnects one pair. Devices are always
/// disconnected, even when the loop fails.
pub async fn run_pair(
    mut pair: Pair,
    opts: LoopOptions,
    cancel: CancellationToken,
) -> Result<LoopStats, Error> {
    let result = async {
        pair.teleop.connect(true).await?;
        pair.robot.connect(true).await?;
        teleop_loop(pair.teleop.as_mut(), pair.robot.as_mut(), &opts, &cancel).await
    }
    .await;

    if pair.teleop.is_connected() {
        if let Err(e) = pair.teleop.disconnect().await {
            warn!("Disconnecting {} failed: {:?}", pair.teleop.name(), e);
        }
    }
    if pair.robot.is_connected() {
        if let Err(e) = pair.robot.disconnect().await {
            warn!("Disconnecting {} failed: {:?}", pair.robot.name(), e);
        }
    }
    result
}

/// Runs every pair concurrently. The first failure cancels the others;
/// stats come back in input order.
pub async fn run_pairs(
    pairs: Vec<Pair>,
    opts: LoopOptions,
    cancel: CancellationToken,
) -> Result<Vec<LoopStats>, Error> {
    let group = cancel.child_token();
    let count = pairs.len();
    let mut set = JoinSet::new();

    for (index, pair) in pairs.into_iter().enumerate() {
        // Only one table can own the terminal.
        let pair_opts = LoopOptions { display_data: opts.display_data && index == 0, ..opts.clone() };
        let token = group.clone();
        set.spawn(async move { (index, run_pair(pair, pair_opts, token).await) });
    }
    info!("Started {} teleoperation pair(s)", count);

    let mut stats = vec![LoopStats::default(); count];
    let mut first_error = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, Ok(s))) => stats[index] = s,
            Ok((index, Err(e))) => {
                error!("Pair {} failed: {:?}", index, e);
                group.cancel();
                first_error.get_or_insert(e);
            }
            Err(e) => {
                error!("Pair task panicked: {:?}", e);
                group.cancel();
                first_error.get_or_insert(Error::Task(e.to_string()));
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(stats),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tara_common::models::Action;
    use tara_common::traits::{MockRobot, MockTeleoperator};

    fn connected_mocks(fail_send: bool) -> Pair {
        let mut teleop = MockTeleoperator::new();
        teleop.expect_name().return_const("gamepadtara".to_string());
        teleop.expect_connect().returning(|_| Ok(()));
        teleop.expect_is_connected().return_const(true);
        teleop.expect_disconnect().times(1).returning(|| Ok(()));
        teleop.expect_get_action().returning(|| Ok(Action::new()));

        let mut robot = MockRobot::new();
        robot.expect_name().return_const("tarabase".to_string());
        robot.expect_connect().returning(|_| Ok(()));
        robot.expect_is_connected().return_const(true);
        robot.expect_disconnect().times(1).returning(|| Ok(()));
        if fail_send {
            robot.expect_send_action().returning(|_| Err(Error::Protocol("bus fault".into())));
        } else {
            robot.expect_send_action().returning(|a| Ok(a.clone()));
        }
        Pair { teleop: Box::new(teleop), robot: Box::new(robot) }
    }

    #[tokio::test]
    async fn pairs_run_until_duration_and_disconnect() {
        let opts = LoopOptions { fps: 50, duration: Some(Duration::from_millis(100)), display_data: false };
        let stats = run_pairs(vec![connected_mocks(false), connected_mocks(false)], opts, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s.iterations > 0));
    }

    #[tokio::test]
    async fn one_failing_pair_stops_the_rest() {
        let opts = LoopOptions { fps: 50, duration: None, display_data: false };
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_pairs(vec![connected_mocks(false), connected_mocks(true)], opts, CancellationToken::new()),
        )
        .await
        .expect("pairs should stop after the failure");
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
