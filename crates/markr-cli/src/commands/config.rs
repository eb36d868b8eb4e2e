//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use markr_core::{Config, DEFAULT_COLOR};

use crate::output::{Output, OutputFormat};

const DECORATION_FLAGS: &[&str] = &[
    "show_gutter_icon",
    "show_gutter_in_overview_ruler",
    "show_text_decoration",
    "always_use_default_color",
    "whole_line",
    "highlight_background",
    "show_border",
    "show_outline",
];

const DECORATION_STRINGS: &[&str] = &[
    "font_weight",
    "text_decoration_line",
    "text_decoration_style",
    "text_decoration_thickness",
    "border",
    "outline",
];

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("Failed to encode configuration")?
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            let d = &config.decoration;
            println!("Configuration:");
            println!("  data_dir:   {}", config.data_dir.display());
            println!(
                "  log_file:   {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!("  view:       {:?} / {:?}", config.view.group_view, config.view.sort);
            println!();
            println!("Colors:");
            for (key, value) in &config.colors {
                println!("  {:<10} {}", key, value);
            }
            println!();
            println!("Decoration:");
            println!("  show_gutter_icon:              {}", d.show_gutter_icon);
            println!("  show_gutter_in_overview_ruler: {}", d.show_gutter_in_overview_ruler);
            println!("  show_text_decoration:          {}", d.show_text_decoration);
            println!("  always_use_default_color:      {}", d.always_use_default_color);
            println!("  whole_line:                    {}", d.whole_line);
            println!("  highlight_background:          {}", d.highlight_background);
            println!(
                "  text_decoration:               {} {} {}",
                d.text_decoration_line, d.text_decoration_style, d.text_decoration_thickness
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let (_, notice) = config.decoration.clone().validated();
    if let Some(notice) = notice.and_then(|e| e.user_notice()) {
        output.notice(&notice);
    }

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

/// Apply one `key = value` assignment
fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let cleared = value.is_empty() || value == "none";

    if let Some(color) = key.strip_prefix("colors.") {
        if cleared {
            if color == DEFAULT_COLOR {
                bail!("The '{}' color cannot be removed", DEFAULT_COLOR);
            }
            config.colors.remove(color);
        } else {
            config.colors.insert(color.to_string(), value.to_string());
        }
        return Ok(());
    }

    if let Some(field) = key.strip_prefix("decoration.") {
        let d = &mut config.decoration;
        if DECORATION_FLAGS.contains(&field) {
            let flag: bool = value
                .parse()
                .with_context(|| format!("Invalid value for {}. Use 'true' or 'false'.", key))?;
            match field {
                "show_gutter_icon" => d.show_gutter_icon = flag,
                "show_gutter_in_overview_ruler" => d.show_gutter_in_overview_ruler = flag,
                "show_text_decoration" => d.show_text_decoration = flag,
                "always_use_default_color" => d.always_use_default_color = flag,
                "whole_line" => d.whole_line = flag,
                "highlight_background" => d.highlight_background = flag,
                "show_border" => d.show_border = flag,
                _ => d.show_outline = flag,
            }
            return Ok(());
        }
        if DECORATION_STRINGS.contains(&field) {
            let value = value.to_string();
            match field {
                "font_weight" => d.font_weight = value,
                "text_decoration_line" => d.text_decoration_line = value,
                "text_decoration_style" => d.text_decoration_style = value,
                "text_decoration_thickness" => d.text_decoration_thickness = value,
                "border" => d.border = value,
                _ => d.outline = value,
            }
            return Ok(());
        }
    }

    match key {
        "data_dir" => {
            config.data_dir = value.into();
        }
        "log_file" => {
            config.log_file = if cleared { None } else { Some(value.into()) };
        }
        "view.group_view" => {
            config.view.group_view = value.parse().map_err(anyhow::Error::msg)?;
        }
        "view.sort" => {
            config.view.sort = value.parse().map_err(anyhow::Error::msg)?;
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: data_dir, log_file, view.group_view, view.sort, \
                 colors.<name>, decoration.<option>",
                key
            );
        }
    }
    Ok(())
}
