use super::*;
use crate::config::SupervisorConfig;
use crate::events::{EventBus, ServiceEvent};
use crate::settings::NodeSettings;
use crate::state::ComponentId;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::time::timeout;

fn sh(script: &str) -> CommandSpec {
    CommandSpec {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        env: BTreeMap::new(),
        working_dir: None,
    }
}

fn process_service(bus: &EventBus, script: &str) -> ProcessService {
    ProcessService::new(
        sh(script),
        HealthProbe::Process,
        bus.for_component(ComponentId::Nelson),
        Duration::from_secs(2),
    )
}

#[test]
fn test_render_template() {
    let settings = NodeSettings {
        iri_port: 14700,
        iri_public: true,
        name: "edge".to_string(),
        protocol: "udp".to_string(),
    };
    let rendered = render_template(
        "--port {port} --remote {public} --name {name} --proto {protocol} --data {storage}/db",
        &settings,
        Path::new("/srv/node"),
    );
    assert_eq!(
        rendered,
        "--port 14700 --remote true --name edge --proto udp --data /srv/node/db"
    );
}

#[test]
fn test_factory_renders_settings_into_commands() {
    let mut config = SupervisorConfig::default();
    config.storage_directory = "/srv/node".into();
    let factory = ProcessServiceFactory::new(config);
    let (bus, _receiver) = EventBus::new();

    let settings = NodeSettings {
        iri_port: 15123,
        ..NodeSettings::default()
    };
    let services = factory.build(&settings, &bus).unwrap();

    assert_eq!(services.iri.component(), ComponentId::Iri);
    assert_eq!(services.nelson.component(), ComponentId::Nelson);
    assert_eq!(
        services.transaction_stream.component(),
        ComponentId::TransactionStream
    );
    assert_eq!(
        services.chatangle_backend.component(),
        ComponentId::ChatangleBackend
    );
    assert_eq!(services.chatangle.component(), ComponentId::Chatangle);
    assert!(services.get(ComponentId::System).is_none());
    assert!(services.get(ComponentId::Database).is_none());
    assert!(!services.iri.is_running());
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_service_lifecycle() {
    let (bus, mut receiver) = EventBus::new();
    let service = process_service(&bus, "echo hello; sleep 30");

    service.start().await.unwrap();
    assert!(service.is_running());

    // Second start is a no-op while running
    service.start().await.unwrap();

    let health = service.health().await.unwrap().unwrap();
    assert!(health["pid"].is_number());

    let mut saw_hello = false;
    let mut saw_started = false;
    while !(saw_hello && saw_started) {
        let event = timeout(Duration::from_secs(5), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        if let ServiceEvent::Message { text, .. } = event {
            saw_hello |= text == "hello";
            saw_started |= text == "started";
        }
    }

    service.stop(StopSignal::Graceful).await.unwrap();
    assert!(!service.is_running());
    assert!(service.health().await.is_err());

    // Stopping again is a no-op
    service.stop(StopSignal::Kill).await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_service_kill() {
    let (bus, _receiver) = EventBus::new();
    let service = process_service(&bus, "trap '' TERM; sleep 30");

    service.start().await.unwrap();
    service.stop(StopSignal::Kill).await.unwrap();
    assert!(!service.is_running());
}

#[cfg(unix)]
#[tokio::test]
async fn test_unexpected_exit_reports_failure() {
    let (bus, mut receiver) = EventBus::new();
    let service = process_service(&bus, "exit 3");

    service.start().await.unwrap();

    let failure = timeout(Duration::from_secs(5), async {
        loop {
            match receiver.recv().await {
                Some(ServiceEvent::Failed { component, error }) => break (component, error),
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .unwrap();

    assert_eq!(failure.0, ComponentId::Nelson);
    assert!(failure.1.contains("exited unexpectedly"));
    assert!(!service.is_running());
}

#[tokio::test]
async fn test_spawn_failure_is_a_service_error() {
    let (bus, _receiver) = EventBus::new();
    let service = ProcessService::new(
        CommandSpec {
            program: "/nonexistent/binary-7f3a".to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        },
        HealthProbe::Process,
        bus.for_component(ComponentId::Chatangle),
        Duration::from_secs(1),
    );

    let result = service.start().await;
    assert!(matches!(
        result,
        Err(crate::error::SupervisorError::Service {
            component: ComponentId::Chatangle,
            ..
        })
    ));
    assert!(!service.is_running());
}
