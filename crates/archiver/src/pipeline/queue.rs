use parking_lot::Mutex;

/// Work list shared by the workers of one phase. Each identifier is handed
/// out exactly once.
pub struct WorkQueue {
    items: Mutex<Vec<String>>,
}

impl WorkQueue {
    pub fn new<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut items: Vec<String> = ids.into_iter().collect();
        // Popping from the tail then yields playlist order.
        items.reverse();
        Self {
            items: Mutex::new(items),
        }
    }

    pub fn pop(&self) -> Option<String> {
        self.items.lock().pop()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn pops_in_insertion_order() {
        let queue = WorkQueue::new(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().as_deref(), Some("a"));
        assert_eq!(queue.pop().as_deref(), Some("b"));
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_consumers_claim_each_item_once() {
        let queue = Arc::new(WorkQueue::new((0..200).map(|i| format!("id{}", i))));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    let mut claimed = Vec::new();
                    while let Some(id) = queue.pop() {
                        claimed.push(id);
                    }
                    claimed
                })
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 200);
    }
}
