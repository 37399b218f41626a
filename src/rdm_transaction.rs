//! One shot, cancellable timer bound to the single outstanding exchange of a port.
//!
//! The platform only has to provide [TransactionTimer]: arm a one shot timer and deliver
//! the [TimerToken] back to the port's event loop once it expires. Every arm hands out a
//! fresh token, so a fire that raced with a cancel or a re-arm is recognized as stale.

/// Identifies one arming of the timer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerToken(pub u32);

/// Platform timer. Fires are delivered on the port's own thread of control,
/// never concurrently with another transition.
pub trait TransactionTimer {
    fn arm(&mut self, token: TimerToken, duration_us: u32);
    /// Cancelling an already fired or cancelled token must be harmless.
    fn cancel(&mut self, token: TimerToken);
}

impl<T: TransactionTimer + ?Sized> TransactionTimer for &mut T {
    fn arm(&mut self, token: TimerToken, duration_us: u32) {
        (**self).arm(token, duration_us)
    }

    fn cancel(&mut self, token: TimerToken) {
        (**self).cancel(token)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransactionState {
    Pending,
    Completed,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RdmTransaction {
    pub token: TimerToken,
    pub state: TransactionState,
}

/// Holds at most one live [RdmTransaction]. Arming a new one cancels the previous.
pub struct RdmTransactionTimer<T: TransactionTimer> {
    timer: T,
    next_token: u32,
    current: Option<RdmTransaction>,
}

impl<T: TransactionTimer> RdmTransactionTimer<T> {
    pub fn new(timer: T) -> Self {
        Self {
            timer,
            next_token: 0,
            current: None,
        }
    }

    pub fn arm(&mut self, duration_us: u32) -> TimerToken {
        self.cancel();

        self.next_token = self.next_token.wrapping_add(1);
        let token = TimerToken(self.next_token);
        self.current = Some(RdmTransaction {
            token,
            state: TransactionState::Pending,
        });
        self.timer.arm(token, duration_us);

        token
    }

    /// Idempotent; does nothing unless a transaction is pending.
    pub fn cancel(&mut self) {
        if let Some(transaction) = self.current.as_mut() {
            if transaction.state == TransactionState::Pending {
                transaction.state = TransactionState::Cancelled;
                self.timer.cancel(transaction.token);
            }
        }
    }

    /// The exchange finished before the deadline.
    pub fn complete(&mut self) {
        if let Some(transaction) = self.current.as_mut() {
            if transaction.state == TransactionState::Pending {
                transaction.state = TransactionState::Completed;
                self.timer.cancel(transaction.token);
            }
        }
    }

    /// Called with a fired token. Returns true only if it belongs to the pending transaction,
    /// which is then marked timed out.
    pub fn expire(&mut self, token: TimerToken) -> bool {
        match self.current.as_mut() {
            Some(transaction)
                if transaction.token == token && transaction.state == TransactionState::Pending =>
            {
                transaction.state = TransactionState::TimedOut;
                true
            },
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == Some(TransactionState::Pending)
    }

    pub fn state(&self) -> Option<TransactionState> {
        self.current.map(|transaction| transaction.state)
    }

    pub fn current(&self) -> Option<RdmTransaction> {
        self.current
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}
