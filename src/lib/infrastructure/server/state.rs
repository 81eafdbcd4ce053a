use crate::application::router::CapabilityRouter;
use crate::application::service::ChatService;
use std::sync::Arc;

pub(crate) struct ServerState {
    service: ChatService,
}

impl ServerState {
    pub(crate) fn new(service: ChatService) -> Self {
        Self { service }
    }

    pub(crate) fn service(&self) -> &ChatService {
        &self.service
    }

    pub(crate) fn router(&self) -> &Arc<CapabilityRouter> {
        self.service.router()
    }
}
