//! 参考对象堆
//!
//! - 对象按槽位存放，句柄为 (索引, 代数)，槽位复用时代数加一，旧句柄即失效
//! - 布局（Shape）组成迁移树：同样顺序添加同样字段的对象共享布局
//! - 不移动的 stop-the-world mark-sweep，根集合为操作数栈

use std::collections::HashMap;

use tracing::debug;

use super::{FieldDescriptor, FieldId, FieldSpec, ObjectMemory};
use crate::error::MemoryError;
use crate::value::{ObjectRef, Value};
use crate::TARGET_VM;

type LayoutId = usize;

/// 空布局
const ROOT_LAYOUT: LayoutId = 0;

/// 对象布局
#[derive(Debug, Default)]
struct Layout {
    /// 字段 ID，按添加顺序，下标即槽位
    fields: Vec<FieldId>,
    /// 添加字段 -> 目标布局
    transitions: HashMap<FieldId, LayoutId>,
}

impl Layout {
    fn slot_of(&self, id: FieldId) -> Option<u32> {
        self.fields.iter().position(|f| *f == id).map(|i| i as u32)
    }
}

#[derive(Debug)]
struct HeapObject {
    layout: LayoutId,
    fields: Vec<Value>,
    marked: bool,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    object: Option<HeapObject>,
}

/// 参考对象堆
#[derive(Debug)]
pub struct ObjectHeap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    layouts: Vec<Layout>,
    live: usize,
    /// 分配时存活对象数达到该值即回收
    threshold: usize,
    gray_queue: Vec<ObjectRef>,
}

impl ObjectHeap {
    pub fn new(config: &b9_config::HeapConfig) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            layouts: vec![Layout::default()],
            live: 0,
            threshold: config.collect_threshold.max(1),
            gray_queue: Vec::new(),
        }
    }

    /// 已创建的布局数（含空布局）
    pub fn layout_count(&self) -> usize {
        self.layouts.len()
    }

    /// 对象当前布局中的字段数
    pub fn field_count(&self, obj: ObjectRef) -> Result<usize, MemoryError> {
        Ok(self.object(obj)?.fields.len())
    }

    fn object(&self, obj: ObjectRef) -> Result<&HeapObject, MemoryError> {
        self.slots
            .get(obj.index as usize)
            .filter(|slot| slot.generation == obj.generation)
            .and_then(|slot| slot.object.as_ref())
            .ok_or(MemoryError::DanglingReference {
                index: obj.index,
                generation: obj.generation,
            })
    }

    fn object_mut(&mut self, obj: ObjectRef) -> Result<&mut HeapObject, MemoryError> {
        self.slots
            .get_mut(obj.index as usize)
            .filter(|slot| slot.generation == obj.generation)
            .and_then(|slot| slot.object.as_mut())
            .ok_or(MemoryError::DanglingReference {
                index: obj.index,
                generation: obj.generation,
            })
    }

    /// 查找或创建迁移目标
    fn transition_target(&mut self, from: LayoutId, id: FieldId) -> LayoutId {
        if let Some(&to) = self.layouts[from].transitions.get(&id) {
            return to;
        }
        let mut fields = self.layouts[from].fields.clone();
        fields.push(id);
        let to = self.layouts.len();
        self.layouts.push(Layout {
            fields,
            transitions: HashMap::new(),
        });
        self.layouts[from].transitions.insert(id, to);
        to
    }

    // ==================== 标记 ====================

    fn mark_gray(&mut self, obj: ObjectRef) {
        let Some(slot) = self.slots.get_mut(obj.index as usize) else {
            return;
        };
        if slot.generation != obj.generation {
            return;
        }
        if let Some(o) = slot.object.as_mut() {
            if !o.marked {
                o.marked = true;
                self.gray_queue.push(obj);
            }
        }
    }

    fn propagate(&mut self) {
        while let Some(obj) = self.gray_queue.pop() {
            let children: Vec<ObjectRef> = match self.object(obj) {
                Ok(o) => o.fields.iter().filter_map(Value::as_object).collect(),
                Err(_) => continue,
            };
            for child in children {
                self.mark_gray(child);
            }
        }
    }
}

impl Default for ObjectHeap {
    fn default() -> Self {
        Self::new(&b9_config::HeapConfig::default())
    }
}

impl ObjectMemory for ObjectHeap {
    fn allocate_empty_object(&mut self, roots: &[Value]) -> Result<ObjectRef, MemoryError> {
        if self.live >= self.threshold {
            self.collect(roots);
        }

        let object = HeapObject {
            layout: ROOT_LAYOUT,
            fields: Vec::new(),
            marked: false,
        };
        let obj = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.object = Some(object);
                ObjectRef::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    object: Some(object),
                });
                ObjectRef::new(index, 0)
            }
        };
        self.live += 1;
        Ok(obj)
    }

    fn lookup_field(
        &self,
        obj: ObjectRef,
        id: FieldId,
    ) -> Result<Option<FieldDescriptor>, MemoryError> {
        let object = self.object(obj)?;
        Ok(self.layouts[object.layout]
            .slot_of(id)
            .map(|slot| FieldDescriptor { slot }))
    }

    fn get_field(&self, obj: ObjectRef, desc: FieldDescriptor) -> Result<Value, MemoryError> {
        self.object(obj)?
            .fields
            .get(desc.slot as usize)
            .copied()
            .ok_or(MemoryError::InvalidDescriptor {
                index: obj.index,
                slot: desc.slot,
            })
    }

    fn set_field(
        &mut self,
        obj: ObjectRef,
        desc: FieldDescriptor,
        value: Value,
    ) -> Result<(), MemoryError> {
        let field = self
            .object_mut(obj)?
            .fields
            .get_mut(desc.slot as usize)
            .ok_or(MemoryError::InvalidDescriptor {
                index: obj.index,
                slot: desc.slot,
            })?;
        *field = value;
        Ok(())
    }

    fn transition_layout(
        &mut self,
        obj: ObjectRef,
        spec: FieldSpec,
        _roots: &[Value],
    ) -> Result<FieldDescriptor, MemoryError> {
        let from = self.object(obj)?.layout;
        if let Some(slot) = self.layouts[from].slot_of(spec.id) {
            return Ok(FieldDescriptor { slot });
        }

        let to = self.transition_target(from, spec.id);
        let object = self.object_mut(obj)?;
        object.layout = to;
        object.fields.push(Value::ZERO);
        Ok(FieldDescriptor {
            slot: (object.fields.len() - 1) as u32,
        })
    }

    fn collect(&mut self, roots: &[Value]) -> usize {
        for root in roots.iter().filter_map(Value::as_object) {
            self.mark_gray(root);
        }
        self.propagate();

        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            match slot.object.as_mut() {
                Some(o) if o.marked => {
                    o.marked = false;
                    continue;
                }
                Some(_) => {}
                None => continue,
            }
            slot.object = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index as u32);
            freed += 1;
        }
        self.live -= freed;

        debug!(target: TARGET_VM, freed, live = self.live, "collected");
        freed
    }

    fn live_objects(&self) -> usize {
        self.live
    }
}
