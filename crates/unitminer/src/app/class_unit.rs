//! Minimal unit for a changed line that sits directly in a class body.

use std::collections::BTreeSet;

use crate::app::boundary::ScopeResolver;
use crate::domain::errors::ResolveError;
use crate::domain::model::ScopeHandle;
use crate::domain::oracle::SymbolOracle;

impl<O: SymbolOracle> ScopeResolver<O> {
    /// The member touching `changed_line` (if any), the class declaration up to its first
    /// member, and the framing of every scope enclosing the class.
    ///
    /// Sibling members are never pulled in. A class without members is one indivisible unit.
    pub fn resolve_class_member_unit(
        &mut self,
        class: &ScopeHandle,
        changed_line: usize,
    ) -> Result<BTreeSet<usize>, ResolveError> {
        let mut lines = BTreeSet::from([changed_line]);
        let members = self.oracle().members_of(class)?;

        let mut touching = Vec::new();
        for member in &members {
            let span = self.decorated_span(member)?;
            if span.contains(changed_line) {
                touching.push(span);
            }
        }
        match touching.as_slice() {
            [] => {}
            [span] => lines.extend(span.lines()),
            _ => {
                return Err(ResolveError::OverlappingScopes {
                    path: class.file.clone(),
                    line: changed_line,
                });
            }
        }

        let header = self.class_header_span(class, &members)?;
        lines.extend(header.lines());

        let parent = self.oracle().parent_of(class)?;
        self.extend_with_enclosing(parent, &mut lines)?;
        Ok(lines)
    }
}
