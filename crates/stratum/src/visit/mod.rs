//! visitor pattern helpers
mod visit_templates;
pub use visit_templates::VisitTemplates;

/// Visitor that visits its subjects by reference
pub trait Visit<T> {
    fn visit(&mut self, value: &T);
}

// blanket impl for FnMut
impl<T, F> Visit<T> for F
where
    F: FnMut(&T),
{
    fn visit(&mut self, value: &T) {
        self(value)
    }
}
