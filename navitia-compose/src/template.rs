use serde::Serialize;
use std::path::Path;
use tera::{Context, Tera};

use crate::error::Result;

/// What the descriptor template knows about one image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    pub name: String,
    pub image: String,
    pub links: Vec<String>,
    /// `host:guest` or bare `guest` entries.
    pub ports: Vec<String>,
    pub expose: Vec<u16>,
    pub volumes: Vec<String>,
}

pub trait DescriptorRenderer {
    fn render(&self, images: &[ImageRecord]) -> Result<String>;
}

/// Renders `<templates_dir>/<name>.yml.tera`.
pub struct TeraRenderer {
    tera: Tera,
    name: String,
}

impl TeraRenderer {
    /// Loads the template, failing if it is missing or does not parse.
    pub fn load(templates_dir: &Path, name: &str) -> Result<TeraRenderer> {
        let name = format!("{}.yml.tera", name);
        let mut tera = Tera::default();
        tera.add_template_file(templates_dir.join(&name), Some(&name))?;

        Ok(TeraRenderer { tera, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl DescriptorRenderer for TeraRenderer {
    fn render(&self, images: &[ImageRecord]) -> Result<String> {
        let mut context = Context::new();
        context.insert("images", images);

        Ok(self.tera.render(&self.name, &context)?)
    }
}
