//! Logging macros
//!
//! Route log statements to the right backend for the build:
//! - `embedded`: `defmt` over RTT
//! - host unit tests: `println!`
//! - host library builds (integration tests): arguments are type-checked
//!   and discarded
//!
//! Format strings must stay `defmt` compatible, so only `{}` and `{:#x}`
//! style placeholders are used.

/// Log informational message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "embedded")]
        ::defmt::info!($($arg)*);

        #[cfg(all(not(feature = "embedded"), test))]
        println!("[INFO] {}", format!($($arg)*));

        #[cfg(all(not(feature = "embedded"), not(test)))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

/// Log warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "embedded")]
        ::defmt::warn!($($arg)*);

        #[cfg(all(not(feature = "embedded"), test))]
        println!("[WARN] {}", format!($($arg)*));

        #[cfg(all(not(feature = "embedded"), not(test)))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

/// Log error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "embedded")]
        ::defmt::error!($($arg)*);

        #[cfg(all(not(feature = "embedded"), test))]
        println!("[ERROR] {}", format!($($arg)*));

        #[cfg(all(not(feature = "embedded"), not(test)))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

/// Log debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "embedded")]
        ::defmt::debug!($($arg)*);

        #[cfg(all(not(feature = "embedded"), test))]
        println!("[DEBUG] {}", format!($($arg)*));

        #[cfg(all(not(feature = "embedded"), not(test)))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_accept_defmt_style_arguments() {
        let address: u32 = 0x40;
        let len = 3usize;
        log_info!("write {:#x} ({} bytes)", address, len);
        log_warn!("retry {}", 2u8);
        log_error!("failed at {:#x}", address);
        log_debug!("chunk done");
    }
}
