//! Gameplay tags.
//!
//! A `Tag` is an interned, hierarchical label such as `"State.DualWielding"`
//! or `"Damage.Fire.Ignite"`. Tags are created through a `TagPool`, which
//! owns the interned names; there is no process-global pool, so independent
//! graphs (and tests) never see each other's tags.
//!
//! A `TagSet` is the mutable set of tags currently applied to a character.
//! It guards itself with a lock and can be shared with producer threads.

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHasher};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Well-known tag names.
pub mod names {
    pub const DUAL_WIELDING: &str = "State.DualWielding";
    pub const BLOCKING: &str = "State.Blocking";
    pub const CHANNELING: &str = "State.Channeling";
    pub const MOVING: &str = "State.Moving";
    pub const LOW_LIFE: &str = "State.LowLife";
    pub const FULL_LIFE: &str = "State.FullLife";

    pub const PURITY_OF_ELEMENTS: &str = "Buff.PurityOfElements";
    pub const FORTIFY: &str = "Buff.Fortify";
    pub const ONSLAUGHT: &str = "Buff.Onslaught";
    pub const ELUSIVE: &str = "Buff.Elusive";

    pub const DAMAGE_FIRE: &str = "Damage.Fire";
    pub const DAMAGE_COLD: &str = "Damage.Cold";
    pub const DAMAGE_LIGHTNING: &str = "Damage.Lightning";
    pub const DAMAGE_PHYSICAL: &str = "Damage.Physical";
    pub const DAMAGE_CHAOS: &str = "Damage.Chaos";

    pub const WEAPON_SWORD: &str = "Equipment.Weapon.Sword";
    pub const WEAPON_AXE: &str = "Equipment.Weapon.Axe";
    pub const WEAPON_WAND: &str = "Equipment.Weapon.Wand";
    pub const SHIELD_EQUIPPED: &str = "Equipment.Shield";

    pub const SKILL_MELEE: &str = "Skill.Melee";
    pub const SKILL_SPELL: &str = "Skill.Spell";
    pub const SKILL_PROJECTILE: &str = "Skill.Projectile";
}

/// An interned tag. Equality and hashing use the precomputed name hash.
#[derive(Clone)]
pub struct Tag {
    hash: u64,
    name: Arc<str>,
}

impl Tag {
    /// Hash a tag name the same way interned tags are hashed.
    pub fn hash_name(name: &str) -> u64 {
        let mut hasher = FxHasher::default();
        name.hash(&mut hasher);
        hasher.finish()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    /// True if this tag equals `parent` or sits below it in the hierarchy.
    ///
    /// `"Damage.Fire.Ignite"` matches `"Damage.Fire"` and `"Damage"`, but
    /// `"Damage.Fireball"` does not match `"Damage.Fire"`.
    pub fn matches_parent(&self, parent: &Tag) -> bool {
        name_matches_parent(&self.name, &parent.name)
    }
}

fn name_matches_parent(name: &str, parent: &str) -> bool {
    match name.strip_prefix(parent) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Tag {}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self.name)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Intern table for tag names.
///
/// Interning the same name twice returns tags sharing one allocation.
///
/// # Examples
///
/// ```rust
/// use statgraph::TagPool;
///
/// let pool = TagPool::new();
/// let ignite = pool.intern("Damage.Fire.Ignite");
/// let fire = pool.intern("Damage.Fire");
///
/// assert!(ignite.matches_parent(&fire));
/// assert_eq!(pool.intern("Damage.Fire"), fire);
/// assert_eq!(pool.len(), 2);
/// ```
#[derive(Default)]
pub struct TagPool {
    names: Mutex<FxHashMap<u64, Arc<str>>>,
}

impl TagPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, name: &str) -> Tag {
        let hash = Tag::hash_name(name);
        let mut names = self.names.lock();
        let name = names
            .entry(hash)
            .or_insert_with(|| Arc::from(name))
            .clone();
        Tag { hash, name }
    }

    /// Number of distinct names interned so far.
    pub fn len(&self) -> usize {
        self.names.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.lock().is_empty()
    }
}

impl fmt::Debug for TagPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagPool").field("len", &self.len()).finish()
    }
}

/// Callback fired after a mutation that changed set membership.
pub type ChangeCallback = Box<dyn Fn() + Send + Sync>;

/// The set of tags currently applied.
///
/// Mutations that change membership fire the change callback exactly once;
/// no-op mutations (adding a present tag, removing an absent one, clearing
/// an empty set) stay silent. The callback runs after the lock is released.
#[derive(Default)]
pub struct TagSet {
    tags: Mutex<FxHashMap<u64, Tag>>,
    on_change: Option<ChangeCallback>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set that notifies `on_change` whenever membership changes.
    pub fn with_callback(on_change: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            tags: Mutex::new(FxHashMap::default()),
            on_change: Some(Box::new(on_change)),
        }
    }

    /// Insert a tag. Returns `true` if it was not already present.
    pub fn add(&self, tag: &Tag) -> bool {
        let inserted = self.tags.lock().insert(tag.hash, tag.clone()).is_none();
        if inserted {
            self.notify();
        }
        inserted
    }

    /// Remove a tag. Returns `true` if it was present.
    pub fn remove(&self, tag: &Tag) -> bool {
        let removed = self.tags.lock().remove(&tag.hash).is_some();
        if removed {
            self.notify();
        }
        removed
    }

    /// Remove every tag. Returns `true` if the set was non-empty.
    pub fn clear(&self) -> bool {
        let had_tags = {
            let mut tags = self.tags.lock();
            let had_tags = !tags.is_empty();
            tags.clear();
            had_tags
        };
        if had_tags {
            self.notify();
        }
        had_tags
    }

    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.lock().contains_key(&tag.hash)
    }

    /// Membership test by name, without interning.
    pub fn has_tag_named(&self, name: &str) -> bool {
        self.tags.lock().contains_key(&Tag::hash_name(name))
    }

    pub fn has_any_tag(&self, tags: &[Tag]) -> bool {
        let set = self.tags.lock();
        tags.iter().any(|t| set.contains_key(&t.hash))
    }

    pub fn has_all_tags(&self, tags: &[Tag]) -> bool {
        let set = self.tags.lock();
        tags.iter().all(|t| set.contains_key(&t.hash))
    }

    /// True if any contained tag equals `parent` or descends from it.
    pub fn has_tag_matching(&self, parent: &Tag) -> bool {
        self.tags.lock().values().any(|t| t.matches_parent(parent))
    }

    /// All contained tags, in no particular order.
    pub fn tags(&self) -> Vec<Tag> {
        self.tags.lock().values().cloned().collect()
    }

    /// Tag names sorted alphabetically.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tags
            .lock()
            .values()
            .map(|t| t.name().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tags.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.lock().is_empty()
    }

    fn notify(&self) {
        if let Some(callback) = &self.on_change {
            callback();
        }
    }
}

impl fmt::Debug for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagSet")
            .field("tags", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_set() -> (TagSet, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let set = TagSet::with_callback(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (set, count)
    }

    #[test]
    fn test_hierarchy_matching() {
        let pool = TagPool::new();
        let ignite = pool.intern("Damage.Fire.Ignite");
        assert!(ignite.matches_parent(&pool.intern("Damage.Fire")));
        assert!(ignite.matches_parent(&pool.intern("Damage")));
        assert!(ignite.matches_parent(&ignite));
        assert!(!pool.intern("Damage.Cold").matches_parent(&pool.intern("Damage.Fire")));
        assert!(!pool.intern("Damage.Fireball").matches_parent(&pool.intern("Damage.Fire")));
        assert!(!pool.intern("Damage").matches_parent(&pool.intern("Damage.Fire")));
    }

    #[test]
    fn test_interning_shares_storage() {
        let pool = TagPool::new();
        let a = pool.intern(names::FORTIFY);
        let b = pool.intern(names::FORTIFY);
        assert!(Arc::ptr_eq(&a.name, &b.name));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_add_notifies_once() {
        let pool = TagPool::new();
        let (set, count) = counting_set();
        let tag = pool.intern(names::DUAL_WIELDING);

        assert!(set.add(&tag));
        assert!(!set.add(&tag));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_remove_and_clear_notify_only_on_change() {
        let pool = TagPool::new();
        let (set, count) = counting_set();
        let tag = pool.intern(names::ONSLAUGHT);

        assert!(!set.remove(&tag));
        assert!(!set.clear());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        set.add(&tag);
        assert!(set.remove(&tag));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        set.add(&tag);
        set.add(&pool.intern(names::FORTIFY));
        assert!(set.clear());
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert!(set.is_empty());
    }

    #[test]
    fn test_queries() {
        let pool = TagPool::new();
        let set = TagSet::new();
        let dual = pool.intern(names::DUAL_WIELDING);
        let purity = pool.intern(names::PURITY_OF_ELEMENTS);
        let ignite = pool.intern("Damage.Fire.Ignite");
        set.add(&dual);
        set.add(&ignite);

        assert!(set.has_tag(&dual));
        assert!(set.has_tag_named("State.DualWielding"));
        assert!(!set.has_tag(&purity));
        assert!(set.has_any_tag(&[purity.clone(), dual.clone()]));
        assert!(!set.has_all_tags(&[purity, dual]));
        assert!(set.has_tag_matching(&pool.intern("Damage")));
        assert!(!set.has_tag_matching(&pool.intern("Damage.Cold")));
        assert_eq!(set.names(), vec!["Damage.Fire.Ignite", "State.DualWielding"]);
    }

    #[test]
    fn test_shared_across_threads() {
        let pool = Arc::new(TagPool::new());
        let set = Arc::new(TagSet::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let pool = pool.clone();
                let set = set.clone();
                std::thread::spawn(move || {
                    set.add(&pool.intern(&format!("Thread.T{i}")));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(set.len(), 4);
        assert!(set.has_tag_matching(&pool.intern("Thread")));
    }
}
