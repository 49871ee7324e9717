//! Hot-plug detection on the expansion UART's RX line.
//!
//! Implements [`DetectPort`].  While armed, a watcher task configures the RX
//! pin as a pulled-up input with a falling-edge interrupt.  The ISR only
//! posts a FreeRTOS task notification; the watcher task then runs the
//! detection hook in thread context and disarms itself (one shot).
//!
//! ```text
//!  RX pin ─▶ GPIO ISR ─▶ Notification ─▶ watcher task ─▶ DetectHook
//! ```

use core::num::NonZeroU32;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use esp_idf_hal::delay::TickType;
use esp_idf_hal::gpio::{AnyIOPin, InterruptType, PinDriver, Pull};
use esp_idf_hal::sys::EspError;
use esp_idf_hal::task::notification::Notification;
use log::{debug, warn};

use crate::app::ports::{DetectHook, DetectPort, UartId};
use crate::drivers::task_pin::{Core, spawn_on_core};
use crate::pins;

/// Watcher poll period; bounds how long `disarm()` waits for the watcher.
const POLL_MS: u64 = 50;

const WATCHER_STACK_KB: usize = 3;
const WATCHER_PRIORITY: u8 = 8;

struct Watch {
    uart: UartId,
    cancel: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Falling-edge detector for the expansion RX lines.
pub struct EspHotplug {
    watch: Mutex<Option<Watch>>,
}

impl EspHotplug {
    pub fn new() -> Self {
        Self {
            watch: Mutex::new(None),
        }
    }
}

impl Default for EspHotplug {
    fn default() -> Self {
        Self::new()
    }
}

fn watch_line(rx_gpio: i32, cancel: &AtomicBool, hook: &DetectHook) {
    // SAFETY: the RX pin is not driven by the UART while detection is armed;
    // the worker disarms before binding.
    let pin = unsafe { AnyIOPin::new(rx_gpio) };
    let mut input = match PinDriver::input(pin) {
        Ok(input) => input,
        Err(e) => {
            warn!("Hotplug: GPIO{} input setup failed: {}", rx_gpio, e);
            return;
        }
    };

    let notification = Notification::new();
    let notifier = notification.notifier();
    let armed = (|| -> Result<(), EspError> {
        input.set_pull(Pull::Up)?;
        input.set_interrupt_type(InterruptType::NegEdge)?;
        // SAFETY: the callback only posts a task notification, which is
        // ISR-safe.
        unsafe {
            input.subscribe(move || {
                if let Some(bits) = NonZeroU32::new(1) {
                    notifier.notify_and_yield(bits);
                }
            })?;
        }
        input.enable_interrupt()
    })();
    if let Err(e) = armed {
        warn!("Hotplug: GPIO{} interrupt setup failed: {}", rx_gpio, e);
        return;
    }

    while !cancel.load(Ordering::Acquire) {
        if notification
            .wait(TickType::new_millis(POLL_MS).ticks())
            .is_some()
        {
            debug!("Hotplug: edge on GPIO{}", rx_gpio);
            // Release the pin before the worker binds the UART to it.
            drop(input);
            hook();
            return;
        }
    }
}

impl DetectPort for EspHotplug {
    fn arm(&self, uart: UartId, hook: DetectHook) {
        let Some((_, rx_gpio)) = pins::expansion_uart_pins(uart) else {
            warn!("Hotplug: {} is not on the expansion connector", uart);
            return;
        };
        let mut slot = self.watch.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = slot.take() {
            // Arming twice replaces the previous watch; it exits on its own.
            old.cancel.store(true, Ordering::Release);
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let task_cancel = cancel.clone();
        let task = spawn_on_core(
            Core::Pro,
            WATCHER_PRIORITY,
            WATCHER_STACK_KB,
            "expansion-det\0",
            move || watch_line(rx_gpio, &task_cancel, &hook),
        );
        match task {
            Ok(task) => *slot = Some(Watch { uart, cancel, task }),
            Err(e) => warn!("Hotplug: watcher spawn failed: {}", e),
        }
    }

    fn disarm(&self, uart: UartId) {
        let watch = {
            let mut slot = self.watch.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.take() {
                Some(w) if w.uart == uart => w,
                other => {
                    *slot = other;
                    return;
                }
            }
        };
        watch.cancel.store(true, Ordering::Release);
        // The watcher that fired runs the hook chain itself; it exits on
        // return and must not wait on its own handle.
        if watch.task.thread().id() != std::thread::current().id()
            && watch.task.join().is_err()
        {
            warn!("Hotplug: watcher panicked");
        }
    }
}
