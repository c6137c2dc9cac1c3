#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = env_logger::try_init();

    let s = match std::str::from_utf8(data) {
        Ok(s) => s,
        Err(_) => return,
    };

    log::debug!("input string = \"\"\"\n{}\n\"\"\"", s);

    let _ = sable_ir::parse::parse(s);
});
