//! Assembler for API reference groups.

use serde_json::json;

use helpforge_shared::{BuildFormat, BuildSettings};

use super::{
    AssemblerBinding, AssemblerComponent, FinishedGroup, FormatAssembler, external_links,
    help_viewer, save_output, shared_content,
};
use crate::context::REFLECTION_FILE;

/// Shared content, link resolution against the reflection data, optional
/// help-viewer data, then output.
#[derive(Debug, Default)]
pub struct ReferenceFormatAssembler {
    binding: AssemblerBinding,
}

impl FormatAssembler for ReferenceFormatAssembler {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn binding(&self) -> &AssemblerBinding {
        &self.binding
    }

    fn binding_mut(&mut self) -> &mut AssemblerBinding {
        &mut self.binding
    }

    fn components(
        &self,
        format: &BuildFormat,
        settings: &BuildSettings,
        group: &FinishedGroup,
    ) -> Vec<AssemblerComponent> {
        let mut components = vec![
            shared_content(settings, group),
            AssemblerComponent::new(
                "ResolveLinks",
                json!({
                    "reflection_file": group.property(REFLECTION_FILE),
                    "link_type": format.link_type,
                    "external": external_links(format),
                }),
            ),
        ];
        components.extend(help_viewer(format, settings));
        components.push(save_output(format));
        components
    }
}
