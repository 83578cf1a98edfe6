use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use pretty_assertions::assert_eq;

use crate::{
    PoolSizing,
    api::ErrorModel,
    service::{
        Submission, TaskStatus,
        tasks::{BUSY_MESSAGE, CANCELLED_MESSAGE, NewTask, RESTART_MESSAGE, TaskKind, TaskOutcome,
            recover_interrupted},
    },
    tests::{test_state, test_state_with_pools, wait_for_status, wait_for_terminal},
};

#[tokio::test]
async fn test_completed_task_lifecycle() {
    let state = test_state();
    let submission = state
        .scheduler
        .submit(
            NewTask::builder()
                .kind(TaskKind::StylesUpload)
                .file_name(Some("styles.tsv".to_string()))
                .build(),
            |handle| async move {
                handle.progress(40.0, "working").await?;
                Ok(TaskOutcome::completed("done"))
            },
        )
        .await
        .unwrap();
    let Submission::Accepted(task) = submission else {
        panic!("submission was rejected");
    };
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.progress, 0.0);

    let task = wait_for_terminal(&state, task.id).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 100.0);
    assert_eq!(task.message.as_deref(), Some("done"));
    assert!(task.started_at.is_some());
    assert!(task.ended_at.is_some());
}

#[tokio::test]
async fn test_queue_full_rejects_with_failed_task() {
    let state = test_state_with_pools(
        PoolSizing {
            parallelism: 1,
            queue_capacity: 8,
        },
        // One worker, no queue: a running task occupies the only slot.
        PoolSizing {
            parallelism: 1,
            queue_capacity: 0,
        },
    );

    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let first = state
        .scheduler
        .submit(
            NewTask::builder().kind(TaskKind::AlgorithmRun).build(),
            move |_handle| async move {
                release_rx.await.ok();
                Ok(TaskOutcome::completed("first done"))
            },
        )
        .await
        .unwrap();
    let Submission::Accepted(first) = first else {
        panic!("first submission must be accepted");
    };

    let executed = Arc::new(AtomicBool::new(false));
    let executed_probe = executed.clone();
    let second = state
        .scheduler
        .submit(
            NewTask::builder().kind(TaskKind::AlgorithmRun).build(),
            move |_handle| async move {
                executed_probe.store(true, Ordering::SeqCst);
                Ok(TaskOutcome::completed("second done"))
            },
        )
        .await
        .unwrap();
    let Submission::Rejected(second) = second else {
        panic!("second submission must be rejected");
    };
    assert_eq!(second.status, TaskStatus::Failed);
    assert!(second.message.as_deref().unwrap().contains("busy"));
    assert_eq!(second.message.as_deref(), Some(BUSY_MESSAGE));
    assert!(second.ended_at.is_some());

    release_tx.send(()).unwrap();
    let first = wait_for_terminal(&state, first.id).await;
    assert_eq!(first.status, TaskStatus::Completed);

    // The rejected task never executed any work.
    assert!(!executed.load(Ordering::SeqCst));
    let second = state.tasks.get(second.id).await.unwrap().unwrap();
    assert_eq!(second.status, TaskStatus::Failed);
}

#[tokio::test]
async fn test_failing_task_records_error_message() {
    let state = test_state();
    let submission = state
        .scheduler
        .submit(
            NewTask::builder().kind(TaskKind::SalesUpload).build(),
            |_handle| async move {
                Err::<TaskOutcome, _>(ErrorModel::bad_request(
                    "boom: bad file",
                    "UploadRejected",
                    None,
                ))
            },
        )
        .await
        .unwrap();
    let task = wait_for_terminal(&state, submission.task().id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_message.as_deref(), Some("boom: bad file"));
    assert!(task.progress < 100.0);
}

#[tokio::test]
async fn test_panicking_task_fails_without_killing_the_worker() {
    let state = test_state();
    let submission = state
        .scheduler
        .submit(
            NewTask::builder().kind(TaskKind::StylesUpload).build(),
            |_handle| async move {
                let explode = true;
                if explode {
                    panic!("worker body exploded");
                }
                Ok(TaskOutcome::completed("unreachable"))
            },
        )
        .await
        .unwrap();
    let task = wait_for_terminal(&state, submission.task().id).await;
    assert_eq!(task.status, TaskStatus::Failed);

    // The worker survives and picks up new work.
    let next = state
        .scheduler
        .submit(
            NewTask::builder().kind(TaskKind::StylesUpload).build(),
            |_handle| async move { Ok(TaskOutcome::completed("fine")) },
        )
        .await
        .unwrap();
    let next = wait_for_terminal(&state, next.task().id).await;
    assert_eq!(next.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_cooperative_cancellation() {
    let state = test_state();
    let submission = state
        .scheduler
        .submit(
            NewTask::builder().kind(TaskKind::AlgorithmRun).build(),
            |handle| async move {
                loop {
                    if handle.cancellation_requested().await? {
                        return Ok(TaskOutcome::Cancelled);
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                }
            },
        )
        .await
        .unwrap();
    let task = submission.task().clone();

    wait_for_status(&state, task.id, TaskStatus::Running).await;
    state.tasks.request_cancellation(task.id).await.unwrap();

    let task = wait_for_terminal(&state, task.id).await;
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(task.message.as_deref(), Some(CANCELLED_MESSAGE));
    assert!(task.progress < 100.0);
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let state = test_state();
    let submission = state
        .scheduler
        .submit(
            NewTask::builder().kind(TaskKind::StylesUpload).build(),
            |handle| async move {
                handle.progress(60.0, "far").await?;
                // A late, lower report must not move progress backwards.
                handle.progress(10.0, "regressing").await?;
                Ok(TaskOutcome::completed("done"))
            },
        )
        .await
        .unwrap();
    let task = wait_for_terminal(&state, submission.task().id).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.phase.as_deref(), Some("regressing"));
    assert_eq!(task.progress, 100.0);

    // Observe intermediate state through a fresh submission that parks
    // between two reports.
    let (probe_tx, probe_rx) = tokio::sync::oneshot::channel::<()>();
    let submission = state
        .scheduler
        .submit(
            NewTask::builder().kind(TaskKind::StylesUpload).build(),
            |handle| async move {
                handle.progress(60.0, "far").await?;
                handle.progress(10.0, "lower").await?;
                probe_rx.await.ok();
                Ok(TaskOutcome::completed("done"))
            },
        )
        .await
        .unwrap();
    let id = submission.task().id;
    let mut seen = 0.0f32;
    for _ in 0..200 {
        let task = state.tasks.get(id).await.unwrap().unwrap();
        assert!(task.progress >= seen, "progress went backwards");
        seen = task.progress;
        if seen >= 60.0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    assert_eq!(seen, 60.0);
    probe_tx.send(()).unwrap();
    wait_for_terminal(&state, id).await;
}

#[tokio::test]
async fn test_recovery_fails_interrupted_tasks() {
    let state = test_state();
    let pending = state
        .tasks
        .create(NewTask::builder().kind(TaskKind::SalesUpload).build())
        .await
        .unwrap();
    let mut running = state
        .tasks
        .create(NewTask::builder().kind(TaskKind::AlgorithmRun).build())
        .await
        .unwrap();
    running.status = TaskStatus::Running;
    state.tasks.update(&running).await.unwrap();
    let mut completed = state
        .tasks
        .create(NewTask::builder().kind(TaskKind::StylesUpload).build())
        .await
        .unwrap();
    completed.status = TaskStatus::Completed;
    completed.progress = 100.0;
    state.tasks.update(&completed).await.unwrap();

    let recovered = recover_interrupted(&state.tasks).await.unwrap();
    assert_eq!(recovered, 2);

    for id in [pending.id, running.id] {
        let task = state.tasks.get(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some(RESTART_MESSAGE));
        assert!(task.ended_at.is_some());
    }
    let untouched = state.tasks.get(completed.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_stats_by_status_and_kind() {
    let state = test_state();
    for _ in 0..2 {
        let submission = state
            .scheduler
            .submit(
                NewTask::builder().kind(TaskKind::StylesUpload).build(),
                |_handle| async move { Ok(TaskOutcome::completed("ok")) },
            )
            .await
            .unwrap();
        wait_for_terminal(&state, submission.task().id).await;
    }
    let submission = state
        .scheduler
        .submit(
            NewTask::builder().kind(TaskKind::StylesUpload).build(),
            |_handle| async move {
                Err::<TaskOutcome, _>(ErrorModel::internal("bad", "SystemError", None))
            },
        )
        .await
        .unwrap();
    wait_for_terminal(&state, submission.task().id).await;

    let counts = state.tasks.count_by_status().await.unwrap();
    assert_eq!(counts.total, 3);
    assert_eq!(counts.completed, 2);
    assert_eq!(counts.failed, 1);

    let stats = state
        .tasks
        .stats_by_kind_since(TaskKind::StylesUpload, 7)
        .await
        .unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 1);
}
