use fleetlab_core::error::{FleetError, FleetResult};
use fleetlab_core::types::UnitDefinition;
use tera::{Context, Tera};

const TEMPLATE_NAME: &str = "docker-compose.yml";

/// Renders unit definitions as docker compose files
pub struct ComposeGenerator {
    tera: Tera,
}

impl ComposeGenerator {
    pub fn new() -> FleetResult<Self> {
        let mut tera = Tera::default();
        let template_content = include_str!("../templates/docker-compose.yml.tera");
        tera.add_raw_template(TEMPLATE_NAME, template_content)
            .map_err(|e| FleetError::Template {
                message: format!("Failed to add compose template: {}", e),
            })?;
        Ok(Self { tera })
    }

    pub fn render(&self, unit: &UnitDefinition) -> FleetResult<String> {
        let mut context = Context::new();
        context.insert("unit", unit);

        self.tera
            .render(TEMPLATE_NAME, &context)
            .map_err(|e| FleetError::Template {
                message: format!("Failed to render compose file for {}: {}", unit.name, e),
            })
    }
}
