use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::error::{IndexError, Result};

thread_local! {
    /// 当前线程正处于哪些 token 的不可取消区段（可嵌套，按 token 身份记录）
    static NON_CANCELABLE: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Default)]
struct CancelState {
    canceled: AtomicBool,
}

/// 协作式取消信号
///
/// 一个 token 对应一次索引任务，可跨线程共享。non-cancelable 区段只对进入它的
/// 线程生效：该线程上 `check_canceled` 不报告取消，其它线程照常报告。
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.state) as usize
    }

    pub fn cancel(&self) {
        self.state.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.state.canceled.load(Ordering::SeqCst)
    }

    /// 当前线程是否在该 token 的不可取消区段内
    pub fn in_non_cancelable_section(&self) -> bool {
        let id = self.id();
        NON_CANCELABLE.with(|stack| stack.borrow().contains(&id))
    }

    pub fn check_canceled(&self) -> Result<()> {
        if self.is_canceled() && !self.in_non_cancelable_section() {
            return Err(IndexError::Canceled);
        }
        Ok(())
    }

    /// 在不可取消区段内执行 `f`
    ///
    /// `f` 的错误（包括 panic）在区段内被捕获，区段退出之后才交还调用方。
    pub fn compute_in_non_cancelable_section<T, E>(
        &self,
        f: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        let outcome = {
            let _section = NonCancelableSection::enter(self.id());
            panic::catch_unwind(AssertUnwindSafe(f))
        };
        match outcome {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => {
                tracing::debug!("error captured inside non-cancelable section");
                Err(e)
            }
            Err(payload) => {
                tracing::debug!("panic captured inside non-cancelable section, resuming");
                panic::resume_unwind(payload)
            }
        }
    }
}

struct NonCancelableSection {
    id: usize,
}

impl NonCancelableSection {
    fn enter(id: usize) -> Self {
        NON_CANCELABLE.with(|stack| stack.borrow_mut().push(id));
        Self { id }
    }
}

impl Drop for NonCancelableSection {
    fn drop(&mut self) {
        NON_CANCELABLE.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|id| *id == self.id) {
                stack.remove(pos);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn cancellation_is_suppressed_inside_section() {
        let token = CancelToken::new();
        assert!(token.check_canceled().is_ok());

        let inner = token.clone();
        let r: Result<u32> = token.compute_in_non_cancelable_section(|| {
            inner.cancel();
            // 区段内部：取消信号已发出但不生效
            inner.check_canceled()?;
            Ok(7)
        });
        assert_eq!(r.unwrap(), 7);
        assert!(!token.in_non_cancelable_section());
        assert!(matches!(token.check_canceled(), Err(IndexError::Canceled)));
    }

    #[test]
    fn errors_surface_after_section_exits() {
        let token = CancelToken::new();
        let r: Result<()> = token.compute_in_non_cancelable_section(|| {
            Err(IndexError::Storage(std::io::Error::new(
                std::io::ErrorKind::Other,
                "inverted index unreadable",
            )))
        });
        assert!(matches!(r, Err(IndexError::Storage(_))));
        assert!(!token.in_non_cancelable_section());
    }

    #[test]
    fn sections_nest() {
        let token = CancelToken::new();
        let t = token.clone();
        token
            .compute_in_non_cancelable_section(|| {
                t.compute_in_non_cancelable_section(|| {
                    assert!(t.in_non_cancelable_section());
                    Ok::<(), IndexError>(())
                })?;
                assert!(t.in_non_cancelable_section());
                Ok::<(), IndexError>(())
            })
            .unwrap();
        assert!(!token.in_non_cancelable_section());
    }

    #[test]
    fn section_only_shields_its_own_thread() {
        let token = CancelToken::new();
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let t = token.clone();
        let worker = std::thread::spawn(move || {
            t.compute_in_non_cancelable_section(|| {
                entered_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                // 本线程在区段内，看不到取消
                t.check_canceled()
            })
        });

        entered_rx.recv().unwrap();
        token.cancel();
        assert!(!token.in_non_cancelable_section());
        assert!(matches!(token.check_canceled(), Err(IndexError::Canceled)));

        release_tx.send(()).unwrap();
        assert!(worker.join().unwrap().is_ok());
    }

    #[test]
    fn sections_are_per_token() {
        let a = CancelToken::new();
        let b = CancelToken::new();
        b.cancel();
        let r = a.compute_in_non_cancelable_section(|| b.check_canceled());
        assert!(matches!(r, Err(IndexError::Canceled)));
    }

    #[test]
    fn panic_leaves_section_before_propagating() {
        let token = CancelToken::new();
        let t = token.clone();
        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            t.compute_in_non_cancelable_section(|| -> Result<()> {
                panic!("extractor blew up");
            })
        }));
        assert!(caught.is_err());
        assert!(!token.in_non_cancelable_section());
        token.cancel();
        assert!(matches!(token.check_canceled(), Err(IndexError::Canceled)));
    }
}
