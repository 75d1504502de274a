//! Loading and building WGSL programs.

use std::path::Path;

use crate::error::{AssetError, BuildError};
use crate::schema::RecordSchema;

/// Read a WGSL source file.
pub fn load_source(path: &Path) -> Result<String, AssetError> {
    let source = std::fs::read_to_string(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("loaded {} ({} bytes)", path.display(), source.len());
    Ok(source)
}

/// Kernel source with the record struct declared in front of it.
pub fn compute_source(schema: &RecordSchema, kernels: &str) -> String {
    format!("{}\n{}", schema.to_wgsl(), kernels)
}

/// Compile `source` into a shader module.
///
/// Errors reported by the compiler, or raised as validation errors while the
/// module is created, fail the build with their text as the log. Warnings are
/// logged.
pub fn build(device: &wgpu::Device, program: &str, source: &str) -> Result<wgpu::ShaderModule, BuildError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(program),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let info = pollster::block_on(module.get_compilation_info());
    let scope = pollster::block_on(device.pop_error_scope());

    let mut log = String::new();
    for message in &info.messages {
        let location = message
            .location
            .map(|l| format!("{}:{}: ", l.line_number, l.line_position))
            .unwrap_or_default();
        match message.message_type {
            wgpu::CompilationMessageType::Error => {
                log.push_str(&format!("{}error: {}\n", location, message.message));
            }
            wgpu::CompilationMessageType::Warning => {
                tracing::warn!("{}: {}{}", program, location, message.message);
            }
            _ => {
                tracing::debug!("{}: {}{}", program, location, message.message);
            }
        }
    }
    if let Some(error) = scope {
        if log.is_empty() {
            log = error.to_string();
        }
    }

    if log.is_empty() {
        tracing::debug!("built {}", program);
        Ok(module)
    } else {
        Err(BuildError {
            program: program.to_string(),
            log,
        })
    }
}

/// Run `create` inside a validation error scope, turning errors into a
/// [`BuildError`] for `program`.
pub fn validated<T>(device: &wgpu::Device, program: &str, create: impl FnOnce() -> T) -> Result<T, BuildError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    match pollster::block_on(device.pop_error_scope()) {
        None => Ok(value),
        Some(error) => Err(BuildError {
            program: program.to_string(),
            log: error.to_string(),
        }),
    }
}

/// Names in `symbols` that never occur as an identifier in `source`.
pub fn missing_symbols<'a>(source: &str, symbols: &[&'a str]) -> Vec<&'a str> {
    symbols
        .iter()
        .copied()
        .filter(|symbol| {
            !source
                .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .any(|word| word == *symbol)
        })
        .collect()
}

/// Warn about optional uniforms a program doesn't declare.
pub fn warn_missing_symbols(program: &str, source: &str, symbols: &[&str]) {
    for symbol in missing_symbols(source, symbols) {
        tracing::warn!("{} does not declare `{}`; it will not be bound", program, symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PARTICLE_SCHEMA;

    #[test]
    fn test_missing_symbols_matches_whole_identifiers() {
        let source = "var<uniform> camera: ViewUniforms; let m = camera.model_view;";
        assert_eq!(
            missing_symbols(source, &["model_view", "projection", "camera"]),
            vec!["projection"]
        );
        assert_eq!(missing_symbols("let model_view_2 = 1;", &["model_view"]), vec!["model_view"]);
    }

    #[test]
    fn test_compute_source_starts_with_record() {
        let source = compute_source(&PARTICLE_SCHEMA, "fn main() {}");
        assert!(source.starts_with("struct Particle {"));
        assert!(source.ends_with("fn main() {}"));
    }

    #[test]
    fn test_load_missing_source_is_asset_error() {
        let err = load_source(Path::new("shaders/nope.wgsl")).unwrap_err();
        assert!(matches!(err, AssetError::Io { .. }));
    }
}
