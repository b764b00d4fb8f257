use super::Supervisor;
use crate::error::Result;
use crate::settings::NodeSettings;
use crate::state::ComponentId;
use tracing::info;

impl Supervisor {
    /// Persist new node settings and apply them.
    ///
    /// While an install is in progress the adapters are swapped without
    /// touching running services; the startup already under way picks them
    /// up. Otherwise everything is stopped, rebuilt and started again.
    pub async fn update_settings(&self, settings: NodeSettings) -> Result<()> {
        let installing = [ComponentId::Iri, ComponentId::Database]
            .iter()
            .any(|component| self.status(*component).is_installing());

        if installing {
            info!("Install in progress, applying settings without restarting services");
            return self.persist_settings(&settings);
        }

        info!("Applying new settings for node '{}'", settings.name);
        self.stop().await;
        self.persist_settings(&settings)?;
        self.start().await
    }

    fn persist_settings(&self, settings: &NodeSettings) -> Result<()> {
        self.inner.settings.save(settings)?;
        self.rebuild_services(settings)
    }
}
