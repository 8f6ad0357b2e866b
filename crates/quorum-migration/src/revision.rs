use crate::schema::Change;

/// A single, immutable step in the revision chain.
#[derive(Clone, Eq, PartialEq)]
pub struct Revision {
    /// The identifier of this revision, unique within a chain
    pub revision: &'static str,
    /// The revision this one was generated against, `None` for the root
    pub down_revision: Option<&'static str>,
    /// Changes that move the schema forward
    pub apply: &'static [Change],
    /// Changes that undo `apply`, must restore the previous schema exactly
    pub revert: &'static [Change],
}

impl Revision {
    pub fn revision(&self) -> &'static str {
        self.revision
    }

    pub fn down_revision(&self) -> Option<&'static str> {
        self.down_revision
    }

    pub fn apply(&self) -> &'static [Change] {
        self.apply
    }

    pub fn revert(&self) -> &'static [Change] {
        self.revert
    }

    pub fn is_root(&self) -> bool {
        self.down_revision.is_none()
    }

    pub fn has_apply(&self) -> bool {
        !self.apply.is_empty()
    }

    pub fn has_revert(&self) -> bool {
        !self.revert.is_empty()
    }
}

impl std::fmt::Debug for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut struct_writer = f.debug_struct("Revision");
        struct_writer.field("revision", &self.revision);
        struct_writer.field("down_revision", &self.down_revision);
        if self.has_apply() {
            struct_writer.field("apply", &self.apply.len());
        }
        if self.has_revert() {
            struct_writer.field("revert", &self.revert.len());
        }
        struct_writer.finish()
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "revision({})", self.revision)
    }
}

/// Declares a [Revision], `root` in the parent position marks the first revision
/// of a chain.
///
/// ```ignore
/// revision!("0002", "0001",
///     apply = [Change::DropColumn { table: "posts", column: "notes" }],
///     revert = [Change::AddColumn { table: "posts", column: NOTES }],
/// )
/// ```
#[macro_export]
macro_rules! revision {
    ($rev:literal, root) => {
        $crate::Revision {
            revision: $rev,
            down_revision: None,
            apply: &[],
            revert: &[],
        }
    };
    ($rev:literal, $parent:literal) => {
        $crate::Revision {
            revision: $rev,
            down_revision: Some($parent),
            apply: &[],
            revert: &[],
        }
    };
    ($rev:literal, root, apply = [$($apply:expr),* $(,)?], revert = [$($revert:expr),* $(,)?] $(,)?) => {
        $crate::Revision {
            revision: $rev,
            down_revision: None,
            apply: &[$($apply),*],
            revert: &[$($revert),*],
        }
    };
    ($rev:literal, $parent:literal, apply = [$($apply:expr),* $(,)?], revert = [$($revert:expr),* $(,)?] $(,)?) => {
        $crate::Revision {
            revision: $rev,
            down_revision: Some($parent),
            apply: &[$($apply),*],
            revert: &[$($revert),*],
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::schema::Change;

    #[test]
    fn declare_empty_root() {
        let revision = revision!("v1", root);
        assert_eq!("v1", revision.revision());
        assert!(revision.is_root());
        assert!(!revision.has_apply());
        assert!(!revision.has_revert());
    }

    #[test]
    fn declare_child() {
        let revision = revision!("v2", "v1");
        assert_eq!(Some("v1"), revision.down_revision());
        assert!(!revision.is_root());
    }

    #[test]
    fn declare_full_revision() {
        static REVISION: crate::Revision = revision!(
            "v3",
            "v2",
            apply = [Change::Execute("SELECT 1")],
            revert = [Change::Execute("SELECT 2"), Change::DropTable("fred")],
        );
        assert_eq!("v3", REVISION.revision());
        assert_eq!(1, REVISION.apply().len());
        assert_eq!(2, REVISION.revert().len());
        assert_eq!("revision(v3)", REVISION.to_string());
    }
}
