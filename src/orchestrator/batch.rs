//! 批次分配器
//!
//! 把完整的搜索词列表确定性地切成 N 个互不重叠、保持顺序的片段，
//! 多个编排进程各取一片并行运行。除不尽时，前 `len % N` 个批次各多分一个。

use crate::error::BatchError;

/// 计算某个批次在原列表中的下标范围
pub fn batch_bounds(len: usize, batch: i64, total_batches: i64) -> Result<std::ops::Range<usize>, BatchError> {
    if total_batches < 1 {
        return Err(BatchError::NoBatches(total_batches));
    }
    if batch < 0 {
        return Err(BatchError::NegativeIndex(batch));
    }
    if batch >= total_batches {
        return Err(BatchError::IndexOutOfRange {
            index: batch,
            total: total_batches,
        });
    }

    // 上面已校验为非负
    let total = total_batches as usize;
    let index = batch as usize;

    let size = len / total;
    let remainder = len % total;
    let start = index * size + index.min(remainder);
    let end = start + size + usize::from(index < remainder);
    Ok(start..end)
}

/// 取出第 `batch` 个批次（从 0 开始）
///
/// # 参数
/// - `items`: 完整列表
/// - `batch`: 批次下标
/// - `total_batches`: 批次总数
///
/// # 返回
/// 该批次的元素，按原顺序排列；参数非法时返回错误，不做截断
pub fn slice<T: Clone>(items: &[T], batch: i64, total_batches: i64) -> Result<Vec<T>, BatchError> {
    let range = batch_bounds(items.len(), batch, total_batches)?;
    Ok(items[range].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uneven_split_front_loads_remainder() {
        let items: Vec<u32> = (0..10).collect();
        let sizes: Vec<usize> = (0..4)
            .map(|b| slice(&items, b, 4).unwrap().len())
            .collect();
        assert_eq!(sizes, vec![3, 3, 2, 2]);
        assert_eq!(slice(&items, 0, 4).unwrap(), vec![0, 1, 2]);
        assert_eq!(slice(&items, 3, 4).unwrap(), vec![8, 9]);
    }

    #[test]
    fn concatenation_reconstructs_input() {
        for len in 0..40usize {
            let items: Vec<usize> = (0..len).collect();
            for total in 1..12i64 {
                let batches: Vec<Vec<usize>> =
                    (0..total).map(|b| slice(&items, b, total).unwrap()).collect();
                let joined: Vec<usize> = batches.iter().flatten().copied().collect();
                assert_eq!(joined, items, "len={len} total={total}");

                let max = batches.iter().map(Vec::len).max().unwrap_or(0);
                let min = batches.iter().map(Vec::len).min().unwrap_or(0);
                assert!(max - min <= 1);
            }
        }
    }

    #[test]
    fn more_batches_than_items_gives_empty_tail() {
        let items = vec!["a", "b"];
        assert_eq!(slice(&items, 0, 5).unwrap(), vec!["a"]);
        assert_eq!(slice(&items, 1, 5).unwrap(), vec!["b"]);
        assert!(slice(&items, 4, 5).unwrap().is_empty());
    }

    #[test]
    fn invalid_arguments_are_signalled() {
        let items = vec![1, 2, 3];
        assert_eq!(slice(&items, 0, 0), Err(BatchError::NoBatches(0)));
        assert_eq!(slice(&items, -1, 2), Err(BatchError::NegativeIndex(-1)));
        assert_eq!(
            slice(&items, 2, 2),
            Err(BatchError::IndexOutOfRange { index: 2, total: 2 })
        );
    }
}
