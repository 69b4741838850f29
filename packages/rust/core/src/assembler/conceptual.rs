//! Assembler for conceptual topic groups.

use serde_json::json;

use helpforge_shared::{BuildFormat, BuildSettings};

use super::{
    AssemblerBinding, AssemblerComponent, FinishedGroup, FormatAssembler, external_links,
    help_viewer, save_output, shared_content,
};
use crate::context::{DDUE_MEDIA, DDUE_XML_DIR};

/// Art links, shared content, conceptual then reference link resolution,
/// optional help-viewer data, then output.
#[derive(Debug, Default)]
pub struct ConceptualFormatAssembler {
    binding: AssemblerBinding,
}

impl FormatAssembler for ConceptualFormatAssembler {
    fn name(&self) -> &'static str {
        "conceptual"
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
            AssemblerComponent::new(
                "ResolveArtLinks",
                json!({
                    "media_dir": group.property(DDUE_MEDIA),
                    "output_folder": format!("{}/media", format.format_folder()),
                }),
            ),
            shared_content(settings, group),
            AssemblerComponent::new(
                "ResolveConceptualLinks",
                json!({
                    "topics_dir": group.property(DDUE_XML_DIR),
                    "link_type": format.link_type,
                    "extension": format.output_extension,
                }),
            ),
            AssemblerComponent::new("ResolveReferenceLinks", external_links(format)),
        ];
        components.extend(help_viewer(format, settings));
        components.push(save_output(format));
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use helpforge_shared::{ContentGroup, FormatKind, GroupKind};

    use crate::context::GroupContext;
    use crate::toc::{TocLayout, TocTree};

    fn group() -> FinishedGroup {
        let mut context =
            GroupContext::new(Arc::new(ContentGroup::new("topics", "Topics", GroupKind::Conceptual)));
        context.create_properties("4");
        FinishedGroup::new(&context, TocTree::new("topics", TocLayout::Flat))
    }

    #[test]
    fn component_order() {
        let names: Vec<String> = ConceptualFormatAssembler::default()
            .components(
                &BuildFormat::new(FormatKind::Mshc, "m"),
                &BuildSettings::default(),
                &group(),
            )
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(
            names,
            [
                "ResolveArtLinks",
                "SharedContent",
                "ResolveConceptualLinks",
                "ResolveReferenceLinks",
                "HelpViewer",
                "SaveOutput"
            ]
        );
    }

    #[test]
    fn topic_directories_come_from_properties() {
        let components = ConceptualFormatAssembler::default().components(
            &BuildFormat::new(FormatKind::Chm, "c"),
            &BuildSettings::default(),
            &group(),
        );
        assert_eq!(components[0].config["media_dir"], "DdueMedia4");
        assert_eq!(components[0].config["output_folder"], "htmlhelp1/media");
        assert_eq!(components[2].config["topics_dir"], "DdueXml4");
    }
}
