//! 遮挡层处理：宽限期等待、强制关闭、有上限的放弃

mod common;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{FakeSurface, Obstruction, Script};
use notebook_batch::config::ObstructionPolicy;
use notebook_batch::infrastructure::{dismiss_transient_obstruction, ObstructionOutcome};

fn policy() -> ObstructionPolicy {
    ObstructionPolicy {
        grace_ms: 3_000,
        poll_interval_ms: 250,
        max_forced_attempts: 3,
    }
}

fn surface(obstruction: Obstruction) -> FakeSurface {
    FakeSurface::new(Script {
        obstruction,
        ..Script::default()
    })
}

#[tokio::test(start_paused = true)]
async fn overlay_that_clears_within_grace_is_not_forced() {
    let surface = surface(Obstruction::ClearsAfter(Duration::from_secs(1)));
    let cancel = CancellationToken::new();

    let outcome = dismiss_transient_obstruction(&surface, &policy(), &cancel)
        .await
        .unwrap();
    assert_eq!(outcome, ObstructionOutcome::Cleared);
    assert_eq!(surface.calls().forced_dismissals, 0);
}

#[tokio::test(start_paused = true)]
async fn overlay_is_forced_after_grace() {
    let surface = surface(Obstruction::ClearsAfterForces(2));
    let cancel = CancellationToken::new();

    let outcome = dismiss_transient_obstruction(&surface, &policy(), &cancel)
        .await
        .unwrap();
    assert_eq!(outcome, ObstructionOutcome::Forced { attempts: 2 });
}

#[tokio::test(start_paused = true)]
async fn stuck_overlay_gives_up_after_bound() {
    let surface = surface(Obstruction::Stuck);
    let cancel = CancellationToken::new();
    let started = tokio::time::Instant::now();

    let outcome = tokio_test::assert_ok!(
        dismiss_transient_obstruction(&surface, &policy(), &cancel).await
    );
    assert_eq!(outcome, ObstructionOutcome::Persisting { attempts: 3 });
    assert_eq!(surface.calls().forced_dismissals, 3);
    // 宽限期 3 秒 + 每次强制关闭后观察 250 毫秒
    assert!(started.elapsed() <= Duration::from_millis(3_000 + 3 * 250 + 100));
}

#[tokio::test(start_paused = true)]
async fn cancelled_wait_reports_cancelled() {
    let surface = surface(Obstruction::Stuck);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = dismiss_transient_obstruction(&surface, &policy(), &cancel)
        .await
        .unwrap();
    assert_eq!(outcome, ObstructionOutcome::Cancelled);
    assert_eq!(surface.calls().forced_dismissals, 0);
}
