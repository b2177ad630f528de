//! Bind-mount rewriting inside container-creation request bodies.
//!
//! Two wire shapes exist for the same concept: the libpod API carries an
//! array of mount objects, the Docker-compatible API carries
//! colon-delimited bind strings under `HostConfig.Binds`. Both are
//! rewritten in place; every field not explicitly targeted passes through
//! untouched, including key order and exact numeric representation.
//!
//! Policy: lenient. Missing or oddly shaped optional fields mean "nothing
//! to translate", never an error. Only an actual translation failure
//! aborts, and it aborts the whole rewrite.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::translate::{TranslateError, Translator};

/// Which creation endpoint the body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Libpod,
    Docker,
}

impl BodyKind {
    /// Match a version-stripped request path against the two intercepted
    /// creation endpoints.
    pub fn for_path(path: &str) -> Option<Self> {
        match path {
            "/libpod/containers/create" => Some(Self::Libpod),
            "/containers/create" => Some(Self::Docker),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("translating bind mount path '{path}': {source}")]
    Translate {
        path: String,
        source: TranslateError,
    },
}

/// Rewrite bind-mount host paths in `body`. Returns whether anything
/// changed.
pub fn rewrite_body(
    kind: BodyKind,
    body: &mut Map<String, Value>,
    translator: &Translator,
) -> Result<bool, RewriteError> {
    match kind {
        BodyKind::Libpod => rewrite_libpod_mounts(body, translator),
        BodyKind::Docker => rewrite_docker_binds(body, translator),
    }
}

fn translate(translator: &Translator, path: &str) -> Result<String, RewriteError> {
    translator
        .translate(path)
        .map_err(|source| RewriteError::Translate {
            path: path.to_string(),
            source,
        })
}

/// libpod shape: `mounts: [{"type": "bind", "source": ..., ...}, ...]`.
/// Only entries typed `bind` have their `source` translated.
fn rewrite_libpod_mounts(
    body: &mut Map<String, Value>,
    translator: &Translator,
) -> Result<bool, RewriteError> {
    let Some(Value::Array(mounts)) = body.get_mut("mounts") else {
        debug!("mounts field not found in request body, assuming no volumes to translate");
        return Ok(false);
    };

    let mut changed = false;
    for mount in mounts {
        let Some(entry) = mount.as_object_mut() else {
            continue;
        };
        if entry.get("type").and_then(Value::as_str) != Some("bind") {
            continue;
        }
        let Some(source) = entry.get("source").and_then(Value::as_str) else {
            continue;
        };
        let source = source.to_string();
        let translated = translate(translator, &source)?;
        if translated != source {
            entry.insert("source".to_string(), Value::String(translated));
            changed = true;
        }
    }
    Ok(changed)
}

/// Docker shape: `HostConfig.Binds: ["host:container[:opts]", ...]`.
/// The first colon-delimited segment of each string entry is translated;
/// non-string entries keep their position untouched.
fn rewrite_docker_binds(
    body: &mut Map<String, Value>,
    translator: &Translator,
) -> Result<bool, RewriteError> {
    let Some(Value::Object(host_config)) = body.get_mut("HostConfig") else {
        debug!("HostConfig field not found in request body, assuming no volumes to translate");
        return Ok(false);
    };
    let Some(Value::Array(binds)) = host_config.get_mut("Binds") else {
        return Ok(false);
    };

    let mut changed = false;
    for bind in binds.iter_mut() {
        let Some(spec) = bind.as_str() else {
            continue;
        };
        let mut parts: Vec<String> = spec.split(':').map(str::to_string).collect();
        let translated = translate(translator, &parts[0])?;
        if translated != parts[0] {
            parts[0] = translated;
            *bind = Value::String(parts.join(":"));
            changed = true;
        }
    }
    Ok(changed)
}
