use anyhow::{Context, Result};

use crate::{io_utils, mapping::MappingRegistry};

/// Header-only CSV for `data_type`, built from the same active mapping list
/// an import validates against. UTF-8 with a byte-order mark.
pub fn render_template<R>(registry: &R, data_type: &str) -> Result<Vec<u8>>
where
    R: MappingRegistry + ?Sized,
{
    let headers = registry
        .active_mappings(data_type)?
        .into_iter()
        .map(|m| m.csv_header)
        .collect::<Vec<_>>();
    io_utils::write_header_line(&headers)
        .with_context(|| format!("Rendering template for '{data_type}'"))
}

pub fn template_file_name(data_type: &str) -> String {
    format!("{data_type}_template.csv")
}
