//! Inbound path from one transport's link stack into the running core.

use super::coordinator::{ControlAction, LinkCoordinator, LinkError, TransportId};
use crate::scroll::{FeatureOutcome, FeatureReportError, FeatureReportHandler};
use std::sync::Arc;

/// Everything a link stack calls into once its transport is registered:
/// status callbacks for its own link and host feature reports.
#[derive(Clone)]
pub struct LinkBinding {
    transport: TransportId,
    coordinator: Arc<LinkCoordinator>,
    features: FeatureReportHandler,
}

impl LinkBinding {
    pub fn new(
        transport: TransportId,
        coordinator: Arc<LinkCoordinator>,
        features: FeatureReportHandler,
    ) -> Self {
        Self {
            transport,
            coordinator,
            features,
        }
    }

    pub fn transport(&self) -> TransportId {
        self.transport
    }

    pub fn on_status(&self, code: u8) -> Result<Vec<ControlAction>, LinkError> {
        self.coordinator.on_transport_status(self.transport, code)
    }

    pub fn on_feature_write(
        &self,
        report_id: u8,
        payload: &[u8],
    ) -> Result<FeatureOutcome, FeatureReportError> {
        self.features.on_feature_write(report_id, payload)
    }

    pub fn read_feature(&self, report_id: u8) -> Result<Vec<u8>, FeatureReportError> {
        self.features.read_feature(report_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::link::{run_gate, LinkState, TransportKind, WirelessLinkState, WirelessStatus};
    use crate::scroll::{ResolutionSettings, SharedScrollConfig, FINE_DIVISOR};
    use crate::transport::bridge::bridge;
    use crate::transport::report::RESOLUTION_FEATURE_ID;

    #[test]
    fn status_and_features_reach_the_core() {
        let scroll = SharedScrollConfig::new(ResolutionSettings::default());
        let (sampler, _gate) = run_gate(false);
        let coordinator = Arc::new(LinkCoordinator::new(
            scroll.clone(),
            EventBus::default(),
            sampler,
        ));
        let (transport, _link) = bridge("ble", TransportKind::Wireless, 1);
        let id = coordinator.register(Arc::new(transport)).unwrap().id;
        let binding = LinkBinding::new(id, coordinator.clone(), FeatureReportHandler::new(scroll.clone()));

        binding.on_status(WirelessStatus::Connected.code()).unwrap();
        assert_eq!(
            coordinator.link_state(id),
            Some(LinkState::Wireless(WirelessLinkState::Connected))
        );
        assert!(binding.on_status(42).is_err());

        binding.on_feature_write(RESOLUTION_FEATURE_ID, &[1]).unwrap();
        assert_eq!(scroll.snapshot().divisor, FINE_DIVISOR);
        assert_eq!(binding.read_feature(RESOLUTION_FEATURE_ID), Ok(vec![1]));
    }
}
