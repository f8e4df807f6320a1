//! 对象内存能力
//!
//! 解释器通过 [`ObjectMemory`] 分配对象、读写字段、触发回收。
//! 凡是可能回收的调用都会带上 `roots`：整个活动操作数栈，
//! 所有帧的参数与局部变量都在其中。

mod heap;

pub use heap::ObjectHeap;

use crate::error::MemoryError;
use crate::value::{ObjectRef, Value};

/// 字段 ID（`PUSH_FROM_OBJECT` / `POP_INTO_OBJECT` 的立即数）
pub type FieldId = u32;

/// 字段描述符：对象布局中的槽位，由内存能力解释
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    pub slot: u32,
}

/// 布局迁移请求：为对象新增一个字段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldSpec {
    pub id: FieldId,
}

/// 对象内存
pub trait ObjectMemory: Send {
    /// 分配空对象，可能先进行一次回收
    fn allocate_empty_object(&mut self, roots: &[Value]) -> Result<ObjectRef, MemoryError>;

    /// 查找字段，不存在时返回 None
    fn lookup_field(
        &self,
        obj: ObjectRef,
        id: FieldId,
    ) -> Result<Option<FieldDescriptor>, MemoryError>;

    fn get_field(&self, obj: ObjectRef, desc: FieldDescriptor) -> Result<Value, MemoryError>;

    fn set_field(
        &mut self,
        obj: ObjectRef,
        desc: FieldDescriptor,
        value: Value,
    ) -> Result<(), MemoryError>;

    /// 迁移到带有新字段的布局，返回新字段的描述符
    fn transition_layout(
        &mut self,
        obj: ObjectRef,
        spec: FieldSpec,
        roots: &[Value],
    ) -> Result<FieldDescriptor, MemoryError>;

    /// 回收，返回释放的对象数
    fn collect(&mut self, roots: &[Value]) -> usize;

    /// 存活对象数
    fn live_objects(&self) -> usize;
}
