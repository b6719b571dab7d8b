#[cfg(not(windows))]
mod fuzz {
    use bootpayload::{
        format::bootimage::{
            BootImageDescriptor, InitBootDescriptor, ParseOptions, VendorBootDescriptor,
        },
        stream::MemoryRegion,
    };
    use honggfuzz::fuzz;

    pub fn main() {
        loop {
            fuzz!(|data: &[u8]| {
                let reader = MemoryRegion::new(data);
                let options = ParseOptions {
                    signature_header_skip: 4096,
                    ..Default::default()
                };

                let _ = BootImageDescriptor::parse(&reader, &options);
                let _ = VendorBootDescriptor::parse(&reader, &options);
                let _ = InitBootDescriptor::parse(&reader, &options);
            });
        }
    }
}

fn main() {
    #[cfg(not(windows))]
    fuzz::main();
}
