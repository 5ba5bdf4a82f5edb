use crate::application::export::ExportService;

#[derive(Clone)]
pub struct ApiState {
    pub exports: ExportService,
}

impl ApiState {
    pub fn new(exports: ExportService) -> Self {
        Self { exports }
    }
}
