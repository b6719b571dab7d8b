#[cfg(not(windows))]
mod fuzz {
    use bootpayload::{cmdline::BootConfigUpdate, format::bootconfig};
    use honggfuzz::fuzz;

    pub fn main() {
        loop {
            fuzz!(|data: &[u8]| {
                let mut region = data.to_vec();
                region.resize(data.len() * 2 + bootconfig::TRAILER_SIZE, 0);

                if let Ok(applied) = bootconfig::append_params(data, &mut region, data.len()) {
                    let _ = bootconfig::Trailer::verify(&region, applied.size);
                }

                let mut update = BootConfigUpdate::new();
                let _ = bootpayload::cmdline::migrate_androidboot_args(Some(data), &mut update);
            });
        }
    }
}

fn main() {
    #[cfg(not(windows))]
    fuzz::main();
}
