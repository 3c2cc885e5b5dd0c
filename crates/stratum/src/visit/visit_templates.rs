use super::Visit;
use crate::collection::{MappingEntry, TemplateNode, UnresolvedTemplate};

/// Recursively visit all [UnresolvedTemplate]s, in declaration order
pub trait VisitTemplates {
    fn visit_templates(&self, visitor: &mut dyn Visit<UnresolvedTemplate>);
}

impl VisitTemplates for TemplateNode {
    fn visit_templates(&self, visitor: &mut dyn Visit<UnresolvedTemplate>) {
        match self {
            TemplateNode::Literal(_) => {}
            TemplateNode::Template(template) => visitor.visit(template),
            TemplateNode::Mapping(entries) => {
                for entry in entries.iter() {
                    match entry {
                        MappingEntry::Field(_, node) => node.visit_templates(visitor),
                        MappingEntry::Merge(node, _) => node.visit_templates(visitor),
                    }
                }
            }
            TemplateNode::List(items) => {
                for item in items.iter() {
                    item.visit_templates(visitor);
                }
            }
            TemplateNode::Concat(concat) => concat.value.visit_templates(visitor),
            TemplateNode::ForEach(for_each) => {
                for_each.target.visit_templates(visitor);
                if let Some(filter) = &for_each.filter {
                    filter.visit_templates(visitor);
                }
                for_each.body.visit_templates(visitor);
            }
            TemplateNode::If(if_node) => {
                if_node.condition.visit_templates(visitor);
                if_node.then.visit_templates(visitor);
                if let Some(otherwise) = &if_node.otherwise {
                    otherwise.visit_templates(visitor);
                }
            }
        }
    }
}
