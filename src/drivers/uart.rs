//! ESP-IDF UART driver for the expansion connector.
//!
//! Implements [`SerialPort`] with raw `uart_*` sys calls.  A reader task
//! drains the driver's RX ring buffer and hands each byte to the installed
//! receive hook; the hook only pushes into a bounded channel, so it never
//! blocks the reader.
//!
//! ```text
//!  UART RX ─▶ IDF ring buffer ─▶ reader task ─▶ RxHook (try_send)
//!  worker ──▶ uart_write_bytes ─▶ UART TX
//! ```

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use esp_idf_svc::sys::*;
use log::{info, warn};

use crate::app::ports::{RxHook, SerialPort, UartId};
use crate::drivers::task_pin::{Core, spawn_on_core};
use crate::error::TransportError;
use crate::pins;

const RX_RING_SIZE: i32 = 512;
const READ_CHUNK: usize = 64;
/// Reader poll period; bounds how long `unbind()` waits for the reader.
const READ_TIMEOUT_MS: u32 = 20;
const TX_DRAIN_TIMEOUT_MS: u32 = 100;

const READER_STACK_KB: usize = 3;
const READER_PRIORITY: u8 = 12;

type SharedHook = Arc<Mutex<Option<RxHook>>>;

struct Binding {
    port: uart_port_t,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

/// Expansion UART backed by the ESP-IDF driver.
pub struct EspUart {
    binding: Option<Binding>,
    hook: SharedHook,
}

impl EspUart {
    pub fn new() -> Self {
        Self {
            binding: None,
            hook: Arc::new(Mutex::new(None)),
        }
    }

    fn port(&self) -> Result<uart_port_t, TransportError> {
        self.binding
            .as_ref()
            .map(|b| b.port)
            .ok_or(TransportError::NotBound)
    }
}

impl Default for EspUart {
    fn default() -> Self {
        Self::new()
    }
}

fn ms_to_ticks(ms: u32) -> TickType_t {
    (ms * configTICK_RATE_HZ / 1000).max(1) as TickType_t
}

fn reader_loop(port: uart_port_t, running: &AtomicBool, hook: &SharedHook) {
    let mut buf = [0u8; READ_CHUNK];
    while running.load(Ordering::Acquire) {
        // SAFETY: `buf` is writable for READ_CHUNK bytes; the driver stays
        // installed until `running` is cleared and this loop has exited.
        let n = unsafe {
            uart_read_bytes(
                port,
                buf.as_mut_ptr().cast(),
                READ_CHUNK as u32,
                ms_to_ticks(READ_TIMEOUT_MS),
            )
        };
        if n <= 0 {
            continue;
        }
        let guard = hook.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hook) = guard.as_ref() {
            for &b in &buf[..n as usize] {
                hook(b);
            }
        }
    }
}

impl SerialPort for EspUart {
    fn bind(&mut self, uart: UartId, baud: u32) -> Result<(), TransportError> {
        if self.binding.is_some() {
            return Err(TransportError::Busy);
        }
        let (tx_pin, rx_pin) = pins::expansion_uart_pins(uart).ok_or(TransportError::Busy)?;
        let port = uart.0 as uart_port_t;

        // SAFETY: plain driver configuration calls on a port this adapter
        // owns exclusively while bound.
        unsafe {
            if uart_is_driver_installed(port) {
                return Err(TransportError::Busy);
            }
            let config = uart_config_t {
                baud_rate: baud as i32,
                data_bits: uart_word_length_t_UART_DATA_8_BITS,
                parity: uart_parity_t_UART_PARITY_DISABLE,
                stop_bits: uart_stop_bits_t_UART_STOP_BITS_1,
                flow_ctrl: uart_hw_flowcontrol_t_UART_HW_FLOWCTRL_DISABLE,
                ..Default::default()
            };
            if uart_param_config(port, &config) != ESP_OK {
                return Err(TransportError::UnsupportedBaud(baud));
            }
            if uart_set_pin(port, tx_pin, rx_pin, UART_PIN_NO_CHANGE, UART_PIN_NO_CHANGE) != ESP_OK
            {
                return Err(TransportError::Busy);
            }
            if uart_driver_install(port, RX_RING_SIZE, 0, 0, core::ptr::null_mut(), 0) != ESP_OK {
                return Err(TransportError::Busy);
            }
        }

        let running = Arc::new(AtomicBool::new(true));
        let reader_running = running.clone();
        let hook = self.hook.clone();
        let reader = spawn_on_core(
            Core::App,
            READER_PRIORITY,
            READER_STACK_KB,
            "expansion-rx\0",
            move || reader_loop(port, &reader_running, &hook),
        );
        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                warn!("EspUart: reader spawn failed: {}", e);
                // SAFETY: installed above, no reader is using it.
                unsafe {
                    uart_driver_delete(port);
                }
                return Err(TransportError::Busy);
            }
        };

        self.binding = Some(Binding {
            port,
            running,
            reader: Some(reader),
        });
        info!("EspUart: {} bound (tx={}, rx={})", uart, tx_pin, rx_pin);
        Ok(())
    }

    fn set_receive_hook(&mut self, hook: Option<RxHook>) {
        *self.hook.lock().unwrap_or_else(PoisonError::into_inner) = hook;
    }

    fn set_baud(&mut self, baud: u32) -> Result<(), TransportError> {
        let port = self.port()?;
        // SAFETY: the driver is installed while bound.
        unsafe {
            // Let pending output (the Status reply) leave at the old rate.
            uart_wait_tx_done(port, ms_to_ticks(TX_DRAIN_TIMEOUT_MS));
            if uart_set_baudrate(port, baud) != ESP_OK {
                return Err(TransportError::UnsupportedBaud(baud));
            }
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let port = self.port()?;
        // SAFETY: `data` is readable for its full length.
        let written = unsafe { uart_write_bytes(port, data.as_ptr().cast(), data.len()) };
        if written < 0 || written as usize != data.len() {
            return Err(TransportError::WriteFailed);
        }
        Ok(())
    }

    fn unbind(&mut self) {
        let Some(mut binding) = self.binding.take() else {
            return;
        };
        binding.running.store(false, Ordering::Release);
        if let Some(reader) = binding.reader.take() {
            if reader.join().is_err() {
                warn!("EspUart: reader panicked");
            }
        }
        // SAFETY: the reader has exited; nothing else uses the driver.
        unsafe {
            uart_driver_delete(binding.port);
        }
        info!("EspUart: port {} released", binding.port);
    }
}

impl Drop for EspUart {
    fn drop(&mut self) {
        self.unbind();
    }
}
