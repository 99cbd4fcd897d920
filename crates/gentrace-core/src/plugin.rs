/*!
# Host Adapter Factory

Build tools all want the same thing from the engine: a name, an ordering
hint, a file predicate and a transform hook. [`create_plugin`] produces that
descriptor once, over any [`TransformCapability`].
*/

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::GentraceConfig;
use crate::filter::FileFilter;
use crate::tracer::{Tracer, TransformOutput};
use crate::Result;

/// Name reported to the host
pub const PLUGIN_NAME: &str = "gentrace";

/// Minimal surface a host adapter needs from the engine
pub trait TransformCapability: Send + Sync {
    fn should_process(&self, id: &str) -> bool;

    fn transform(&self, code: &str, id: &str) -> Result<TransformOutput>;
}

/// Engine plus file filter
pub struct TracerCapability {
    tracer: Tracer,
    filter: FileFilter,
}

impl TracerCapability {
    pub fn new(tracer: Tracer, filter: FileFilter) -> Self {
        Self { tracer, filter }
    }

    pub fn from_config(config: &GentraceConfig) -> Result<Self> {
        Ok(Self::new(
            Tracer::new(config.options.clone())?,
            FileFilter::new(&config.include, &config.exclude)?,
        ))
    }
}

impl TransformCapability for TracerCapability {
    fn should_process(&self, id: &str) -> bool {
        self.filter.should_process(id)
    }

    fn transform(&self, code: &str, id: &str) -> Result<TransformOutput> {
        self.tracer.transform(code, id)
    }
}

/// Ordering hint relative to the host's own transforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforce {
    Pre,
    Post,
}

/// Transformed code handed back to the host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginOutput {
    pub code: String,
    pub map: Option<String>,
}

/// Host-independent plugin description
#[derive(Clone)]
pub struct PluginDescriptor {
    pub name: &'static str,
    pub enforce: Enforce,
    capability: Arc<dyn TransformCapability>,
}

impl PluginDescriptor {
    pub fn new(capability: Arc<dyn TransformCapability>) -> Self {
        Self {
            name: PLUGIN_NAME,
            enforce: Enforce::Pre,
            capability,
        }
    }

    pub fn should_process(&self, id: &str) -> bool {
        self.capability.should_process(id)
    }

    /// `Ok(None)` when the file is filtered out or left unchanged
    pub fn transform_hook(&self, code: &str, id: &str) -> Result<Option<PluginOutput>> {
        if !self.capability.should_process(id) {
            debug!(file = id, "filtered out");
            return Ok(None);
        }

        let output = self.capability.transform(code, id)?;
        if !output.transformed {
            return Ok(None);
        }

        Ok(Some(PluginOutput {
            code: output.code,
            map: output.map,
        }))
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("enforce", &self.enforce)
            .finish_non_exhaustive()
    }
}

/// Build a plugin descriptor from a configuration
pub fn create_plugin(config: &GentraceConfig) -> Result<PluginDescriptor> {
    Ok(PluginDescriptor::new(Arc::new(TracerCapability::from_config(config)?)))
}
