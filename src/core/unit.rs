//! systemd unit generation.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::layout::RemoteLayout;
use crate::utils::io;
use crate::utils::template::{render, TemplateVars};

const UNIT_TEMPLATE: &str = "\
[Unit]
Description={{app}}
After=network.target

[Service]
Type=simple
WorkingDirectory={{current}}
ExecStart={{current}}/{{app}}
Restart=always
RestartSec=5
LimitNOFILE={{limitNofile}}

[Install]
WantedBy=multi-user.target
";

/// Render the unit for the app in `layout`; paths resolve through `current`.
pub fn render_unit(layout: &RemoteLayout, limit_nofile: u64) -> String {
    let current = layout.current_link();
    let limit = limit_nofile.to_string();
    render(
        UNIT_TEMPLATE,
        &[
            (TemplateVars::APP, layout.app_name()),
            (TemplateVars::CURRENT, current.as_str()),
            (TemplateVars::LIMIT_NOFILE, limit.as_str()),
        ],
    )
}

/// Write the rendered unit into `dir`, returning its path.
pub fn write_unit(dir: &Path, layout: &RemoteLayout, limit_nofile: u64) -> Result<PathBuf> {
    let path = dir.join(layout.unit_file_name());
    io::write_file(&path, &render_unit(layout, limit_nofile), "write service unit")?;
    Ok(path)
}
