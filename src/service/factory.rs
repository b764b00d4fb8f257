use super::contract::{ManagedService, ServiceFactory, ServiceSet};
use super::health::HealthProbe;
use super::process::{CommandSpec, ProcessService};
use crate::config::{ServiceConfig, SupervisorConfig};
use crate::error::Result;
use crate::events::EventBus;
use crate::settings::NodeSettings;
use crate::state::ComponentId;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Expand `{port}`, `{public}`, `{name}`, `{protocol}` and `{storage}`
pub fn render_template(template: &str, settings: &NodeSettings, storage: &Path) -> String {
    template
        .replace("{port}", &settings.iri_port.to_string())
        .replace("{public}", &settings.iri_public.to_string())
        .replace("{name}", &settings.name)
        .replace("{protocol}", &settings.protocol)
        .replace("{storage}", &storage.to_string_lossy())
}

/// Builds process-backed adapters from the supervisor configuration
pub struct ProcessServiceFactory {
    config: SupervisorConfig,
}

impl ProcessServiceFactory {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    fn build_one(
        &self,
        component: ComponentId,
        service: &ServiceConfig,
        settings: &NodeSettings,
        events: &EventBus,
    ) -> Result<Arc<dyn ManagedService>> {
        let storage = self.config.storage_directory.as_path();
        let render = |template: &str| render_template(template, settings, storage);

        let command = CommandSpec {
            program: render(&service.program),
            args: service.args.iter().map(|arg| render(arg)).collect(),
            env: service
                .env
                .iter()
                .map(|(key, value)| (key.clone(), render(value)))
                .collect(),
            working_dir: service.working_dir.clone(),
        };
        debug!("{} command: {:?}", component, command);

        let health = HealthProbe::from_config(&service.health, render)?;
        Ok(Arc::new(ProcessService::new(
            command,
            health,
            events.for_component(component),
            self.config.timing.stop_grace(),
        )))
    }
}

impl ServiceFactory for ProcessServiceFactory {
    fn build(&self, settings: &NodeSettings, events: &EventBus) -> Result<ServiceSet> {
        let services = &self.config.services;
        Ok(ServiceSet {
            iri: self.build_one(ComponentId::Iri, &services.iri, settings, events)?,
            nelson: self.build_one(ComponentId::Nelson, &services.nelson, settings, events)?,
            transaction_stream: self.build_one(
                ComponentId::TransactionStream,
                &services.transaction_stream,
                settings,
                events,
            )?,
            chatangle_backend: self.build_one(
                ComponentId::ChatangleBackend,
                &services.chatangle_backend,
                settings,
                events,
            )?,
            chatangle: self.build_one(
                ComponentId::Chatangle,
                &services.chatangle,
                settings,
                events,
            )?,
        })
    }
}
