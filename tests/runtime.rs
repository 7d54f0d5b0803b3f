mod common;

use std::time::Duration;

use cip_safety::sfa::SafetyFormat;
use cip_safety::validator::ValidatorError;
use cip_safety::{
    CMD_DATA, CMD_FORWARD_OPEN, CMD_TCOO, CMD_TX_DATA, Classify, StackError, StackHandle, Unit,
    command,
};
use common::{Kind, OpenRequest, addressed, stack, tcoo_frame};

#[tokio::test]
async fn test_stack_runs_on_its_own_task() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let handle = StackHandle::spawn(stack(2), Duration::from_millis(5));

    let request = OpenRequest::new(Kind::Producer, SafetyFormat::Base);
    let bytes = request.bytes();
    handle
        .cmd_process(command(CMD_FORWARD_OPEN, Unit::Sce), bytes.len() as u16, &bytes, 0)
        .await
        .unwrap();
    handle.produce(1, &[1, 2, 3, 4], true, 10).await.unwrap();
    let tcoo = addressed(1, Some(1), &tcoo_frame(SafetyFormat::Base, request.triad, 0, 900));
    handle
        .cmd_process(command(CMD_TCOO, Unit::Svc), tcoo.len() as u16, &tcoo, 20)
        .await
        .unwrap();

    // wrong direction for a producer instance
    let data = addressed(1, None, &[0; 16]);
    assert_eq!(
        handle
            .cmd_process(command(CMD_DATA, Unit::Svs), data.len() as u16, &data, 30)
            .await,
        Err(StackError::WrongInstanceKind(1).into())
    );

    // let the periodic background task run a few times
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stack = handle.shut_down().await.unwrap();
    let sent = &stack.transport().sent;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].0, command(CMD_TX_DATA, Unit::Svc));
    assert_eq!(
        stack.app().errors,
        vec![(StackError::WrongInstanceKind(1).error_code(), 1, 1)]
    );
}

#[tokio::test]
async fn test_background_task_on_request() {
    let handle = StackHandle::spawn(stack(1), Duration::from_secs(3600));
    let request = OpenRequest::new(Kind::Producer, SafetyFormat::Extended);
    let bytes = request.bytes();
    handle
        .cmd_process(command(CMD_FORWARD_OPEN, Unit::Sce), bytes.len() as u16, &bytes, 0)
        .await
        .unwrap();
    handle.produce(1, &[0; 4], true, 0).await.unwrap();
    let tcoo = addressed(1, Some(1), &tcoo_frame(SafetyFormat::Extended, request.triad, 0, 77));
    handle
        .cmd_process(command(CMD_TCOO, Unit::Svc), tcoo.len() as u16, &tcoo, 1)
        .await
        .unwrap();
    for now in 0..501u16 {
        handle.produce(1, &[0; 4], true, now).await.unwrap();
    }
    handle.background_task().await.unwrap();

    let stack = handle.shut_down().await.unwrap();
    let (code, _, elapsed) = stack.app().errors[0];
    assert_eq!(
        code,
        ValidatorError::ResponseTimeout {
            elapsed: 501,
            limit: 500
        }
        .error_code()
    );
    assert_eq!(elapsed, 501);
    assert!(!stack.is_latched());
}
