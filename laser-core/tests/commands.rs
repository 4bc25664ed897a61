use laser_core::{Command, CommandError, CommandValue, Flags, TransportError};
use laser_devkit::{DeviceRecordBuilder, EnvelopeBuilder, TestHarness};

async fn started(records: Vec<laser_core::DeviceRecord>) -> TestHarness {
    let mut harness = TestHarness::with_devices(records);
    harness.start().await.unwrap();
    harness
}

#[tokio::test]
async fn test_disable_requests_remote_authority_first() {
    let harness = started(vec![DeviceRecordBuilder::new("A")
        .software_switch(true)
        .remote_control(false)
        .build()])
    .await;

    let outcomes = harness.session.dispatcher().disable("A").outcome().await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert_eq!(
        harness.sent(),
        vec![
            ("A".to_string(), Command::Remote, Some(CommandValue::Bool(true))),
            ("A".to_string(), Command::Disable, None),
        ]
    );
}

#[tokio::test]
async fn test_disable_with_remote_authority() {
    let harness = started(vec![DeviceRecordBuilder::new("A")
        .software_switch(true)
        .remote_control(true)
        .build()])
    .await;

    harness.session.dispatcher().disable("A").outcome().await;

    assert_eq!(harness.sent(), vec![("A".to_string(), Command::Disable, None)]);
}

#[tokio::test]
async fn test_disable_already_off_sends_nothing() {
    let harness = started(vec![DeviceRecordBuilder::new("A").software_switch(false).build()]).await;

    let handle = harness.session.dispatcher().disable("A");
    assert!(handle.is_noop());
    assert!(handle.outcome().await.is_empty());
    assert!(harness.sent().is_empty());
}

#[tokio::test]
async fn test_disable_follows_streamed_flags() {
    let harness = started(vec![DeviceRecordBuilder::new("A").software_switch(false).build()]).await;

    let flags = Flags {
        software_switch: true,
        remote_control: true,
        ..Default::default()
    };
    harness.push(&EnvelopeBuilder::flags().device_flags("A", flags).build()).unwrap();
    harness
        .wait_for(2000, |registry| registry.get("A").map(|d| d.flags.software_switch).unwrap_or(false))
        .await
        .unwrap();

    harness.session.dispatcher().disable("A").outcome().await;
    assert_eq!(harness.sent(), vec![("A".to_string(), Command::Disable, None)]);
}

#[tokio::test]
async fn test_failed_remote_still_attempts_disable() {
    let harness = started(vec![DeviceRecordBuilder::new("A")
        .software_switch(true)
        .remote_control(false)
        .build()])
    .await;
    harness.api.fail_command(Command::Remote);

    let outcomes = harness.session.dispatcher().disable("A").outcome().await;

    assert_eq!(outcomes.len(), 2);
    assert!(matches!(
        outcomes[0].result,
        Err(CommandError::Transport(TransportError::Status { status: 500, .. }))
    ));
    assert_eq!(outcomes[1].request.command, Command::Disable);
    assert!(outcomes[1].is_ok());
    assert_eq!(harness.sent().len(), 2);
}

#[tokio::test]
async fn test_toggle_remote_control_inverts_current_flag() {
    let harness = started(vec![
        DeviceRecordBuilder::new("A").remote_control(true).build(),
        DeviceRecordBuilder::new("B").remote_control(false).build(),
    ])
    .await;

    harness.session.dispatcher().toggle_remote_control("A").outcome().await;
    harness.session.dispatcher().toggle_remote_control("B").outcome().await;

    assert_eq!(
        harness.sent(),
        vec![
            ("A".to_string(), Command::Remote, Some(CommandValue::Bool(false))),
            ("B".to_string(), Command::Remote, Some(CommandValue::Bool(true))),
        ]
    );
    // l'effet n'est visible qu'après un push du device-server
    assert!(harness.flags("A").unwrap().remote_control);
}

#[tokio::test]
async fn test_set_power_and_enable_are_sent_verbatim() {
    let harness = started(vec![DeviceRecordBuilder::new("A").build()]).await;

    harness.session.dispatcher().set_power("A", 25.5).outcome().await;
    harness.session.dispatcher().enable("A").outcome().await;

    assert_eq!(
        harness.sent(),
        vec![
            ("A".to_string(), Command::Power, Some(CommandValue::Number(25.5))),
            ("A".to_string(), Command::Enable, None),
        ]
    );
    assert!(harness.history("A", laser_core::Signal::PowerSetpoint).unwrap().is_empty());
}

#[tokio::test]
async fn test_composites_skip_unknown_serial() {
    let harness = started(vec![DeviceRecordBuilder::new("A").build()]).await;
    let dispatcher = harness.session.dispatcher();

    assert!(dispatcher.disable("Z").is_noop());
    assert!(dispatcher.toggle_remote_control("Z").is_noop());
    assert!(dispatcher.shutdown_device("Z").is_noop());
    assert!(harness.sent().is_empty());
}

#[tokio::test]
async fn test_set_power_limit_is_local_only() {
    let harness = started(vec![DeviceRecordBuilder::new("A").build()]).await;

    harness.session.dispatcher().set_power_limit(250.0);

    let registry = harness.session.registry();
    assert_eq!(registry.lock().power_limit(), 250.0);
    assert_eq!(registry.lock().get("A").unwrap().power_limit, 250.0);
    assert!(harness.sent().is_empty());
}

#[tokio::test]
async fn test_detached_command_still_goes_out() {
    let harness = started(vec![DeviceRecordBuilder::new("A").build()]).await;

    harness.session.dispatcher().enable("A").detach();

    let api = harness.api.clone();
    for _ in 0..100 {
        if !api.sent_commands().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(api.sent_commands(), vec![("A".to_string(), Command::Enable, None)]);
}
