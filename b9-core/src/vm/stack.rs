//! 操作数栈
//!
//! 所有活动帧共享同一个栈：参数由调用方压入，局部变量由 `push_n` 紧接其上分配，
//! 返回时用 `restore` 丢弃整个帧。

use crate::error::InterpreterFault;
use crate::value::Value;

/// 栈位置游标（`top()` 返回，`restore()` 使用）
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct StackCursor(usize);

impl StackCursor {
    pub fn height(&self) -> usize {
        self.0
    }
}

/// 操作数栈
#[derive(Debug, Clone)]
pub struct OperandStack {
    values: Vec<Value>,
    limit: usize,
}

impl OperandStack {
    /// 创建栈，`limit` 为可容纳的最大值数量
    pub fn new(limit: usize) -> Self {
        Self {
            values: Vec::with_capacity(limit.min(1024)),
            limit,
        }
    }

    /// 压栈
    #[inline]
    pub fn push(&mut self, value: Value) -> Result<(), InterpreterFault> {
        if self.values.len() >= self.limit {
            return Err(InterpreterFault::StackOverflow { limit: self.limit });
        }
        self.values.push(value);
        Ok(())
    }

    /// 弹栈
    #[inline]
    pub fn pop(&mut self) -> Result<Value, InterpreterFault> {
        self.values.pop().ok_or(InterpreterFault::StackUnderflow)
    }

    /// 弹出两个值 (先弹出的是右操作数)
    #[inline]
    pub fn pop_two(&mut self) -> Result<(Value, Value), InterpreterFault> {
        let right = self.pop()?;
        let left = self.pop()?;
        Ok((left, right))
    }

    /// 查看栈顶
    #[inline]
    pub fn peek(&self) -> Result<Value, InterpreterFault> {
        self.values.last().copied().ok_or(InterpreterFault::StackUnderflow)
    }

    /// 预留 n 个默认值槽位（局部变量）
    pub fn push_n(&mut self, n: usize) -> Result<(), InterpreterFault> {
        if n > self.limit - self.values.len() {
            return Err(InterpreterFault::StackOverflow { limit: self.limit });
        }
        self.values.resize(self.values.len() + n, Value::ZERO);
        Ok(())
    }

    /// 当前栈顶位置
    #[inline]
    pub fn top(&self) -> StackCursor {
        StackCursor(self.values.len())
    }

    /// 丢弃 `cursor` 之上的所有值
    pub fn restore(&mut self, cursor: StackCursor) -> Result<(), InterpreterFault> {
        if cursor.0 > self.values.len() {
            return Err(InterpreterFault::InvalidRestore {
                cursor: cursor.0,
                height: self.values.len(),
            });
        }
        self.values.truncate(cursor.0);
        Ok(())
    }

    /// 按绝对位置读取
    #[inline]
    pub fn get(&self, index: usize) -> Result<Value, InterpreterFault> {
        self.values
            .get(index)
            .copied()
            .ok_or(InterpreterFault::StackUnderflow)
    }

    /// 按绝对位置写入
    #[inline]
    pub fn set(&mut self, index: usize, value: Value) -> Result<(), InterpreterFault> {
        let slot = self
            .values
            .get_mut(index)
            .ok_or(InterpreterFault::StackUnderflow)?;
        *slot = value;
        Ok(())
    }

    /// 由游标构造（帧起点由高度换算得到）
    pub fn cursor_at(&self, height: usize) -> Result<StackCursor, InterpreterFault> {
        if height > self.values.len() {
            return Err(InterpreterFault::InvalidRestore {
                cursor: height,
                height: self.values.len(),
            });
        }
        Ok(StackCursor(height))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 全部活动值（GC 根集合）
    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [Value] {
        &mut self.values
    }
}

// ==================== 测试 ====================
