//! 带代数句柄的槽位链表
//!
//! 槽位存放在连续数组里，空闲槽位复用；每个槽位额外记录前后链接，
//! 保持“表头为最新”的迭代顺序，插入、按句柄删除都是 O(1)。
//! 槽位被释放后代数加一，旧句柄自然失效。
//!
//! 多个链表可以共享一个 [`PoolBudget`]，预算用尽时插入返回 `None`
//! 并累加拒绝计数，不视为错误。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// 槽位句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SlotHandle {
    index: u32,
    generation: u32,
}

impl SlotHandle {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// 共享的粒子数量预算
#[derive(Debug)]
pub struct PoolBudget {
    capacity: usize,
    used: AtomicUsize,
    rejected: AtomicU64,
}

impl PoolBudget {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: AtomicUsize::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    /// 占用一个名额；预算已满时累加拒绝计数并返回 `false`
    pub fn try_acquire(&self) -> bool {
        let acquired = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.capacity).then_some(used + 1)
            })
            .is_ok();
        if !acquired {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }
        acquired
    }

    pub fn release(&self, count: usize) {
        if count > 0 {
            let _ = self
                .used
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                    Some(used.saturating_sub(count))
                });
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn take_rejected(&self) -> u64 {
        self.rejected.swap(0, Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct Slot<T> {
    value: Option<T>,
    generation: u32,
    prev: Option<u32>,
    next: Option<u32>,
}

/// 槽位链表
#[derive(Debug)]
pub struct SlotList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
    budget: Option<std::sync::Arc<PoolBudget>>,
}

impl<T> Default for SlotList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotList<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            budget: None,
        }
    }

    /// 插入受共享预算约束的链表
    pub fn with_budget(budget: std::sync::Arc<PoolBudget>) -> Self {
        let mut list = Self::new();
        list.budget = Some(budget);
        list
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 已分配的槽位数（含空闲）
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn handle_of(&self, index: u32) -> SlotHandle {
        SlotHandle {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn slot(&self, h: SlotHandle) -> Option<&Slot<T>> {
        self.slots
            .get(h.index as usize)
            .filter(|s| s.generation == h.generation && s.value.is_some())
    }

    pub fn contains(&self, h: SlotHandle) -> bool {
        self.slot(h).is_some()
    }

    pub fn get(&self, h: SlotHandle) -> Option<&T> {
        self.slot(h).and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, h: SlotHandle) -> Option<&mut T> {
        self.slots
            .get_mut(h.index as usize)
            .filter(|s| s.generation == h.generation)
            .and_then(|s| s.value.as_mut())
    }

    pub fn front(&self) -> Option<SlotHandle> {
        self.head.map(|i| self.handle_of(i))
    }

    pub fn back(&self) -> Option<SlotHandle> {
        self.tail.map(|i| self.handle_of(i))
    }

    pub fn next(&self, h: SlotHandle) -> Option<SlotHandle> {
        self.slot(h)?.next.map(|i| self.handle_of(i))
    }

    pub fn prev(&self, h: SlotHandle) -> Option<SlotHandle> {
        self.slot(h)?.prev.map(|i| self.handle_of(i))
    }

    fn allocate(&mut self, value: T) -> Option<u32> {
        if let Some(budget) = &self.budget {
            if !budget.try_acquire() {
                return None;
            }
        }
        let index = match self.free.pop() {
            Some(i) => {
                self.slots[i as usize].value = Some(value);
                i
            }
            None => {
                self.slots.push(Slot {
                    value: Some(value),
                    generation: 0,
                    prev: None,
                    next: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.len += 1;
        Some(index)
    }

    fn link_between(&mut self, index: u32, prev: Option<u32>, next: Option<u32>) {
        {
            let slot = &mut self.slots[index as usize];
            slot.prev = prev;
            slot.next = next;
        }
        match prev {
            Some(p) => self.slots[p as usize].next = Some(index),
            None => self.head = Some(index),
        }
        match next {
            Some(n) => self.slots[n as usize].prev = Some(index),
            None => self.tail = Some(index),
        }
    }

    fn unlink(&mut self, index: u32) {
        let (prev, next) = {
            let slot = &self.slots[index as usize];
            (slot.prev, slot.next)
        };
        match prev {
            Some(p) => self.slots[p as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n as usize].prev = prev,
            None => self.tail = prev,
        }
        let slot = &mut self.slots[index as usize];
        slot.prev = None;
        slot.next = None;
    }

    /// 插入到表头（最新）
    pub fn push_front(&mut self, value: T) -> Option<SlotHandle> {
        let index = self.allocate(value)?;
        let head = self.head;
        self.link_between(index, None, head);
        Some(self.handle_of(index))
    }

    pub fn push_back(&mut self, value: T) -> Option<SlotHandle> {
        let index = self.allocate(value)?;
        let tail = self.tail;
        self.link_between(index, tail, None);
        Some(self.handle_of(index))
    }

    /// 插入到 `at` 之前；`at` 失效时插入到表尾
    pub fn insert_before(&mut self, at: SlotHandle, value: T) -> Option<SlotHandle> {
        if !self.contains(at) {
            return self.push_back(value);
        }
        let index = self.allocate(value)?;
        let prev = self.slots[at.index as usize].prev;
        self.link_between(index, prev, Some(at.index));
        Some(self.handle_of(index))
    }

    /// 把已有元素移到 `at` 之前
    pub fn move_before(&mut self, h: SlotHandle, at: SlotHandle) -> bool {
        if h == at || !self.contains(h) || !self.contains(at) {
            return false;
        }
        self.unlink(h.index);
        let prev = self.slots[at.index as usize].prev;
        self.link_between(h.index, prev, Some(at.index));
        true
    }

    /// 按句柄删除，旧句柄随即失效
    pub fn remove(&mut self, h: SlotHandle) -> Option<T> {
        self.slot(h)?;
        self.unlink(h.index);
        let slot = &mut self.slots[h.index as usize];
        let value = slot.value.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(h.index);
        self.len -= 1;
        if let Some(budget) = &self.budget {
            budget.release(1);
        }
        value
    }

    /// 清空并释放预算；所有旧句柄失效
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        if let Some(budget) = &self.budget {
            budget.release(self.len);
        }
        self.free = (0..self.slots.len() as u32).rev().collect();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// 清空并归还槽位内存
    pub fn shrink(&mut self) {
        self.clear();
        self.slots = Vec::new();
        self.free = Vec::new();
    }

    /// 从表头到表尾
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cur: self.head,
        }
    }

    /// 从表头到表尾的句柄快照
    pub fn handles(&self) -> Vec<SlotHandle> {
        self.iter().map(|(h, _)| h).collect()
    }

    /// 按顺序访问并修改每个元素
    pub fn for_each_mut(&mut self, mut f: impl FnMut(SlotHandle, &mut T)) {
        let mut cur = self.head;
        while let Some(i) = cur {
            let slot = &mut self.slots[i as usize];
            cur = slot.next;
            let h = SlotHandle {
                index: i,
                generation: slot.generation,
            };
            if let Some(v) = slot.value.as_mut() {
                f(h, v);
            }
        }
    }

    /// 删除 `keep` 返回 `false` 的元素，返回删除数量
    pub fn retain(&mut self, mut keep: impl FnMut(&mut T) -> bool) -> usize {
        let mut removed = 0;
        let mut cur = self.head;
        while let Some(i) = cur {
            cur = self.slots[i as usize].next;
            let keep_it = self.slots[i as usize].value.as_mut().map_or(true, &mut keep);
            if !keep_it {
                let h = self.handle_of(i);
                self.remove(h);
                removed += 1;
            }
        }
        removed
    }
}

/// 丢弃时归还仍占用的预算
impl<T> Drop for SlotList<T> {
    fn drop(&mut self) {
        if let Some(budget) = &self.budget {
            budget.release(self.len);
        }
    }
}

/// 顺序迭代器
pub struct Iter<'a, T> {
    list: &'a SlotList<T>,
    cur: Option<u32>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (SlotHandle, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cur?;
        let slot = &self.list.slots[index as usize];
        self.cur = slot.next;
        let h = SlotHandle {
            index,
            generation: slot.generation,
        };
        slot.value.as_ref().map(|v| (h, v))
    }
}
