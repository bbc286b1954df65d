// SPDX-License-Identifier: MIT

//! `zallet apply` — submit a service spec (spec.md §4.F `Apply`).

use std::io::Read;
use std::path::PathBuf;

use clap::Args;

use zallet_wire::{ContentType, Request};

use crate::client::{self, ok_or_exit};
use crate::exit_error::ExitError;
use crate::output::{print_message, OutputFormat};

#[derive(Args)]
pub struct ApplyArgs {
    /// Path to a JSON or YAML service spec; reads stdin if omitted or `-`.
    pub file: Option<PathBuf>,

    /// Force JSON parsing regardless of the file extension.
    #[arg(long, conflicts_with = "yaml")]
    pub json: bool,

    /// Force YAML parsing regardless of the file extension.
    #[arg(long, conflicts_with = "json")]
    pub yaml: bool,
}

pub async fn run(args: ApplyArgs, format: OutputFormat) -> Result<(), ExitError> {
    let body = read_body(&args.file)?;
    let content_type = resolve_content_type(&args, args.file.as_deref());

    let response = client::call(&Request::Apply { content_type, body }).await?;
    match ok_or_exit(response)? {
        zallet_wire::Response::Text { message } => {
            print_message(&format!("service {message} applied"), format);
            Ok(())
        }
        other => Err(ExitError::new(1, format!("unexpected response from daemon: {other:?}"))),
    }
}

fn read_body(file: &Option<PathBuf>) -> Result<String, ExitError> {
    match file {
        None => read_stdin(),
        Some(path) if path.as_os_str() == "-" => read_stdin(),
        Some(path) => std::fs::read_to_string(path)
            .map_err(|err| ExitError::new(1, format!("failed to read {}: {err}", path.display()))),
    }
}

fn read_stdin() -> Result<String, ExitError> {
    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .map_err(|err| ExitError::new(1, format!("failed to read stdin: {err}")))?;
    Ok(body)
}

fn resolve_content_type(args: &ApplyArgs, file: Option<&std::path::Path>) -> ContentType {
    if args.json {
        return ContentType::Json;
    }
    if args.yaml {
        return ContentType::Yaml;
    }
    match file.and_then(|p| p.extension()).and_then(|ext| ext.to_str()) {
        Some("json") => ContentType::Json,
        _ => ContentType::Yaml,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(json: bool, yaml: bool) -> ApplyArgs {
        ApplyArgs { file: None, json, yaml }
    }

    #[test]
    fn json_extension_selects_json_without_flags() {
        let path = PathBuf::from("spec.json");
        assert_eq!(resolve_content_type(&args(false, false), Some(&path)), ContentType::Json);
    }

    #[test]
    fn yaml_extension_and_no_extension_select_yaml() {
        assert_eq!(
            resolve_content_type(&args(false, false), Some(std::path::Path::new("spec.yaml"))),
            ContentType::Yaml
        );
        assert_eq!(resolve_content_type(&args(false, false), None), ContentType::Yaml);
    }

    #[test]
    fn explicit_flag_overrides_extension() {
        let path = PathBuf::from("spec.yaml");
        assert_eq!(resolve_content_type(&args(true, false), Some(&path)), ContentType::Json);
    }
}
