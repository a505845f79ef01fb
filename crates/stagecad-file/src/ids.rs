//! 导出标识分配
//!
//! 为灯具、桁架、支撑分配全局唯一的正整数编号：
//! 1. 先保留灯具已有且在灯具之间唯一的编号（重复的编号全部作废重新分配）；
//! 2. 其余对象从 1 向上扫描，跳过已保留的值；
//! 3. 桁架与支撑每次导出都重新分配，不看已有值。
//!
//! 同时给出配套的文本标识：去除首尾空白的显示名，名字为空时用编号本身。

use stagecad_core::entity::{EntityKey, EntityKind, SceneEntity};
use stagecad_core::scene::Scene;
use std::collections::{HashMap, HashSet};

/// 分配结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedId {
    pub label: String,
    pub numeric: u32,
}

impl AllocatedId {
    fn new(name: &str, numeric: u32) -> Self {
        let trimmed = name.trim();
        let label = if trimmed.is_empty() {
            numeric.to_string()
        } else {
            trimmed.to_string()
        };
        Self { label, numeric }
    }
}

#[derive(Debug, Default)]
pub struct IdAllocation {
    ids: HashMap<EntityKey, AllocatedId>,
}

impl IdAllocation {
    pub fn get(&self, key: &EntityKey) -> Option<&AllocatedId> {
        self.ids.get(key)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &AllocatedId)> {
        self.ids.iter()
    }

    /// 把分配结果写回场景
    pub fn apply_to(&self, scene: &mut Scene) {
        for fixture in scene.fixtures.values_mut() {
            if let Some(id) = self.ids.get(&fixture.key()) {
                fixture.fixture_id = id.numeric;
            }
        }
        for truss in scene.trusses.values_mut() {
            if let Some(id) = self.ids.get(&truss.key()) {
                truss.numeric_id = id.numeric;
            }
        }
        for support in scene.supports.values_mut() {
            if let Some(id) = self.ids.get(&support.key()) {
                support.numeric_id = id.numeric;
            }
        }
    }
}

/// 从 1 开始扫描的空闲编号游标
///
/// 保留集合只增不减，所以游标之前的值一定都已被占用。
struct NextFree {
    reserved: HashSet<u32>,
    cursor: u32,
}

impl NextFree {
    fn take(&mut self) -> u32 {
        while self.reserved.contains(&self.cursor) {
            self.cursor += 1;
        }
        let value = self.cursor;
        self.reserved.insert(value);
        value
    }
}

/// 对整个场景执行一次分配
pub fn allocate_ids(scene: &Scene) -> IdAllocation {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for fixture in scene.fixtures.values() {
        if fixture.fixture_id > 0 {
            *counts.entry(fixture.fixture_id).or_default() += 1;
        }
    }
    let is_unique = |id: u32| id > 0 && counts.get(&id) == Some(&1);

    let mut free = NextFree {
        reserved: counts
            .iter()
            .filter(|(_, &count)| count == 1)
            .map(|(&id, _)| id)
            .collect(),
        cursor: 1,
    };

    let mut allocation = IdAllocation::default();

    for fixture in scene.fixtures.values() {
        let numeric = if is_unique(fixture.fixture_id) {
            fixture.fixture_id
        } else {
            let value = free.take();
            tracing::debug!(
                "Fixture '{}' renumbered {} -> {}",
                fixture.name,
                fixture.fixture_id,
                value
            );
            value
        };
        allocation
            .ids
            .insert(fixture.key(), AllocatedId::new(&fixture.name, numeric));
    }

    for truss in scene.trusses.values() {
        allocation
            .ids
            .insert(truss.key(), AllocatedId::new(&truss.name, free.take()));
    }

    for support in scene.supports.values() {
        allocation
            .ids
            .insert(support.key(), AllocatedId::new(&support.name, free.take()));
    }

    tracing::debug!("Allocated {} numeric identifiers", allocation.ids.len());
    allocation
}

/// 判断实体类型是否参与编号
pub fn is_numbered(kind: EntityKind) -> bool {
    matches!(kind, EntityKind::Fixture | EntityKind::Truss | EntityKind::Support)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagecad_core::entity::{Fixture, Support, Truss};

    fn fixture(name: &str, id: u32) -> Fixture {
        let mut f = Fixture::new(name);
        f.fixture_id = id;
        f
    }

    #[test]
    fn test_unique_fixture_ids_are_kept() {
        let mut scene = Scene::new();
        let a = scene.add_fixture(fixture("A", 5));
        let b = scene.add_fixture(fixture("B", 0));

        let ids = allocate_ids(&scene);
        let key_a = EntityKey::new(EntityKind::Fixture, a);
        let key_b = EntityKey::new(EntityKind::Fixture, b);

        assert_eq!(ids.get(&key_a).map(|i| i.numeric), Some(5));
        assert_eq!(ids.get(&key_b).map(|i| i.numeric), Some(1));
    }

    #[test]
    fn test_duplicate_fixture_ids_are_reallocated() {
        let mut scene = Scene::new();
        let a = scene.add_fixture(fixture("A", 1));
        let b = scene.add_fixture(fixture("B", 1));
        let c = scene.add_fixture(fixture("C", 2));

        let ids = allocate_ids(&scene);
        let numeric = |uuid: &String| {
            ids.get(&EntityKey::new(EntityKind::Fixture, uuid.clone()))
                .map(|i| i.numeric)
                .unwrap()
        };

        // 1 被两盏灯共用，全部作废；2 保留
        assert_eq!(numeric(&c), 2);
        let mut reassigned = vec![numeric(&a), numeric(&b)];
        reassigned.sort();
        assert_eq!(reassigned, vec![1, 3]);
    }

    #[test]
    fn test_truss_and_support_always_fresh() {
        let mut scene = Scene::new();
        scene.add_fixture(fixture("A", 1));
        let mut truss = Truss::new("T");
        truss.numeric_id = 1;
        let truss_id = scene.add_truss(truss);
        let mut support = Support::new("");
        support.numeric_id = 99;
        let support_id = scene.add_support(support);

        let ids = allocate_ids(&scene);
        let truss_alloc = ids.get(&EntityKey::new(EntityKind::Truss, truss_id)).unwrap();
        let support_alloc = ids
            .get(&EntityKey::new(EntityKind::Support, support_id))
            .unwrap();

        assert_eq!(truss_alloc.numeric, 2);
        assert_eq!(support_alloc.numeric, 3);
        // 空名回退为编号
        assert_eq!(support_alloc.label, "3");
    }

    #[test]
    fn test_all_ids_positive_and_distinct() {
        let mut scene = Scene::new();
        for i in 0..20 {
            scene.add_fixture(fixture(&format!(" F{} ", i), i % 7));
        }
        for i in 0..5 {
            scene.add_truss(Truss::new(format!("T{}", i)));
            scene.add_support(Support::new(format!("S{}", i)));
        }

        let ids = allocate_ids(&scene);
        assert_eq!(ids.len(), 30);
        let mut seen = HashSet::new();
        for (_, id) in ids.iter() {
            assert!(id.numeric > 0);
            assert!(seen.insert(id.numeric));
            assert_eq!(id.label, id.label.trim());
        }
    }

    #[test]
    fn test_apply_to_writes_back() {
        let mut scene = Scene::new();
        let uuid = scene.add_truss(Truss::new("T"));
        let ids = allocate_ids(&scene);
        ids.apply_to(&mut scene);
        assert_eq!(scene.trusses[&uuid].numeric_id, 1);
    }
}
