/// One upgrade step applied to stored data, e.g. renaming a material that a
/// newer game version no longer knows.
///
/// Migrations must be idempotent: running one on data it already upgraded
/// returns `false` and leaves the data alone.
pub trait Migration<M>: Send + Sync {
    /// Upgrade `target` in place. Returns `true` if anything changed.
    fn migrate(&self, target: &mut M) -> bool;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// An ordered collection of migrations. Every migration is consulted for
/// every target, in insertion order.
pub struct MigrationSet<M> {
    migrations: Vec<Box<dyn Migration<M>>>,
}

impl<M> MigrationSet<M> {
    pub fn new() -> Self {
        Self {
            migrations: Vec::new(),
        }
    }

    pub fn add(&mut self, migration: impl Migration<M> + 'static) {
        self.migrations.push(Box::new(migration));
    }

    /// Run every migration on `target`. Returns `true` if any of them changed it.
    pub fn apply(&self, target: &mut M) -> bool {
        let mut changed = false;
        for migration in &self.migrations {
            if migration.migrate(target) {
                tracing::trace!("Migration '{}' applied", migration.name());
                changed = true;
            }
        }
        changed
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl<M> Default for MigrationSet<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{BlockPos, LightRecord};

    struct Rename(&'static str, &'static str);

    impl Migration<LightRecord> for Rename {
        fn migrate(&self, target: &mut LightRecord) -> bool {
            if target.material == self.0 {
                target.material = self.1.to_owned();
                true
            } else {
                false
            }
        }
    }

    fn record(material: &str) -> LightRecord {
        LightRecord {
            position: BlockPos::new(0, 0, 0),
            luminance: 5,
            migrated: false,
            material: material.to_owned(),
        }
    }

    #[test]
    fn migrations_run_in_order() {
        let mut set = MigrationSet::new();
        set.add(Rename("GRASS", "GRASS_BLOCK"));
        set.add(Rename("GRASS_BLOCK", "MOSS_BLOCK"));
        assert_eq!(set.len(), 2);

        let mut target = record("GRASS");
        assert!(set.apply(&mut target));
        assert_eq!(target.material, "MOSS_BLOCK");
    }

    #[test]
    fn untouched_target_reports_no_change() {
        let mut set = MigrationSet::new();
        set.add(Rename("GRASS", "GRASS_BLOCK"));
        let mut target = record("STONE");
        assert!(!set.apply(&mut target));
        assert_eq!(target, record("STONE"));
    }
}
