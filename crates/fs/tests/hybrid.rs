use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use device::{FlashAccess, FlashMedia, FlashRegion};
use fs::{FsOps, ImageBuilder, create_firmware_filesystem, create_hybrid_filesystem};
use sync::ArchOps;
use vfs::access::{can_read, can_write};
use vfs::{
    ActiveFilesystemRegistry, FileAttr, FileSystem, FileSystemType, FsError, OpenFlags, SeekWhence,
    UserRole,
};

struct HostArchOps {
    enabled: AtomicBool,
}

impl ArchOps for HostArchOps {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        self.enabled.swap(false, Ordering::SeqCst) as usize
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        self.enabled.store(flags != 0, Ordering::SeqCst);
    }

    fn intr_enable_mask(&self) -> usize {
        1
    }

    fn cpu_id(&self) -> usize {
        0
    }
}

struct HostFsOps {
    now: AtomicU32,
}

impl FsOps for HostFsOps {
    fn now(&self) -> u32 {
        self.now.fetch_add(1, Ordering::Relaxed)
    }

    fn max_open_files(&self) -> usize {
        8
    }
}

static ARCH: HostArchOps = HostArchOps {
    enabled: AtomicBool::new(true),
};
static CLOCK: HostFsOps = HostFsOps {
    now: AtomicU32::new(1_700_000_000),
};
static INIT: Once = Once::new();

fn init() {
    INIT.call_once(|| unsafe {
        sync::register_arch_ops(&ARCH);
        fs::register_fs_ops(&CLOCK);
    });
}

fn image() -> Arc<FlashRegion> {
    init();
    let index: Vec<u8> = test_support::pattern(500, 1).collect();
    let image = ImageBuilder::new()
        .add("index.html", &index)
        .add_with(
            ".htpasswd",
            b"admin:secret",
            FileAttr::READ_ONLY,
            fs::DEFAULT_ACL,
            0,
        )
        .build()
        .unwrap();
    FlashRegion::from_bytes(0x40_0000, image, 4096, FlashAccess::ReadOnly)
}

fn partition() -> Arc<FlashRegion> {
    init();
    FlashRegion::new(0x50_0000, 16 * 1024, 4096, FlashAccess::ReadWrite)
}

/// 激活一个新格式化的混合文件系统
fn activate(registry: &ActiveFilesystemRegistry, flash: Arc<FlashRegion>) {
    let hybrid = create_hybrid_filesystem(image(), flash);
    match hybrid.mount() {
        Ok(()) => {}
        Err(FsError::NotFormatted) => {
            hybrid.format().unwrap();
            hybrid.mount().unwrap();
        }
        Err(e) => panic!("mount: {e}"),
    }
    registry.set_active(Some(hybrid));
}

#[test]
fn test_fresh_volume_exposes_image() {
    let registry = ActiveFilesystemRegistry::new();
    activate(&registry, partition());
    assert_eq!(registry.fs_type(), FileSystemType::Hybrid);

    let file = registry.open("index.html", OpenFlags::READ).unwrap();
    let stat = registry.fstat(file).unwrap();
    assert_eq!(stat.size, 500);
    registry.close(file).unwrap();

    assert_eq!(registry.stat("/index.html").unwrap().size, 500);
    assert_eq!(registry.list("/").unwrap(), ["index.html", ".htpasswd"]);
    assert_eq!(
        registry.get_content("index.html").unwrap(),
        test_support::pattern(500, 1).collect::<Vec<u8>>()
    );
}

#[test]
fn test_written_file_listed_before_image() {
    let registry = ActiveFilesystemRegistry::new();
    activate(&registry, partition());

    let body = br#"{"ssid":"home","password":"0123456"}"#;
    let padded: Vec<u8> = body.iter().copied().chain(*b"\n\n\n\n\n\n").collect();
    assert_eq!(padded.len(), 42);

    let file = registry
        .open("config.json", OpenFlags::CREATE | OpenFlags::WRITE)
        .unwrap();
    assert_eq!(registry.write(file, &padded).unwrap(), 42);
    registry.close(file).unwrap();

    assert_eq!(
        registry.list("").unwrap(),
        ["config.json", "index.html", ".htpasswd"]
    );
    assert_eq!(registry.get_content("config.json").unwrap(), padded);
    assert_eq!(registry.get_size("config.json"), 42);
}

#[test]
fn test_image_files_cannot_be_modified() {
    let registry = ActiveFilesystemRegistry::new();
    activate(&registry, partition());

    let before = registry.list("/").unwrap();
    assert_eq!(registry.remove("index.html"), Err(FsError::ReadOnly));
    assert_eq!(
        registry.open("index.html", OpenFlags::WRITE),
        Err(FsError::ReadOnly)
    );
    assert!(registry.exists("index.html"));
    assert_eq!(registry.list("/").unwrap(), before);
    assert_eq!(registry.get_size("index.html"), 500);
}

#[test]
fn test_format_discards_writable_files() {
    let registry = ActiveFilesystemRegistry::new();
    activate(&registry, partition());
    registry.set_content("config.json", b"{}").unwrap();
    assert!(registry.exists("config.json"));

    registry.format().unwrap();
    assert_eq!(
        registry.open("config.json", OpenFlags::READ),
        Err(FsError::NotFound)
    );
    assert_eq!(registry.list("/").unwrap(), ["index.html", ".htpasswd"]);
    assert_eq!(registry.check().unwrap(), 0);
}

#[test]
fn test_exhausted_handles_leave_files_intact() {
    let registry = ActiveFilesystemRegistry::new();
    activate(&registry, partition());
    registry.set_content("a.txt", b"hello").unwrap();

    let held: Vec<_> = (0..8)
        .map(|_| registry.open_file("index.html", OpenFlags::READ).unwrap())
        .collect();
    assert_eq!(
        registry
            .open("a.txt", OpenFlags::CREATE_NEW_ALWAYS | OpenFlags::WRITE)
            .err(),
        Some(FsError::TooManyOpenFiles)
    );
    assert_eq!(
        registry.set_content("b.txt", b"new"),
        Err(FsError::TooManyOpenFiles)
    );
    drop(held);

    assert_eq!(registry.get_content("a.txt").unwrap(), b"hello");
    assert!(!registry.exists("b.txt"));
}

#[test]
fn test_file_guard_round_trip() {
    let registry = ActiveFilesystemRegistry::new();
    activate(&registry, partition());

    let mut file = registry
        .open_file("log.txt", OpenFlags::CREATE | OpenFlags::WRITE | OpenFlags::READ)
        .unwrap();
    file.write_all(b"line one\n").unwrap();
    file.flush().unwrap();
    assert_eq!(file.seek(0, SeekWhence::Start), Ok(0));
    assert_eq!(file.read_to_end().unwrap(), b"line one\n");
    drop(file);

    let names: Vec<String> = registry
        .open_dir("/")
        .unwrap()
        .map(|entry| entry.unwrap().name)
        .collect();
    assert_eq!(names, ["log.txt", "index.html", ".htpasswd"]);
    assert_eq!(registry.get_size("log.txt"), 9);
}

#[test]
fn test_contents_survive_reboot() {
    let flash = partition();
    let registry = ActiveFilesystemRegistry::new();
    activate(&registry, flash.clone());
    registry.set_content("web/settings.js", b"var a = 1;").unwrap();
    registry.release();
    assert!(!registry.is_active());
    assert_eq!(registry.stat("web/settings.js"), Err(FsError::NoFileSystem));

    activate(&registry, flash);
    assert_eq!(
        registry.get_content("web/settings.js").unwrap(),
        b"var a = 1;"
    );
    assert_eq!(registry.list("web").unwrap(), ["web/settings.js"]);
}

#[test]
fn test_get_content_into_truncates() {
    let registry = ActiveFilesystemRegistry::new();
    activate(&registry, partition());
    registry.set_content("a.txt", b"abcdef").unwrap();

    let mut buf = [0xFFu8; 4];
    assert_eq!(
        registry.get_content_into("a.txt", &mut buf),
        Err(FsError::BufferTooSmall)
    );
    assert_eq!(&buf, b"abc\0");

    let mut buf = [0xFFu8; 16];
    assert_eq!(registry.get_content_into("a.txt", &mut buf), Ok(6));
    assert_eq!(&buf[..7], b"abcdef\0");
}

#[test]
fn test_system_files_need_admin() {
    let registry = ActiveFilesystemRegistry::new();
    activate(&registry, partition());

    let secret = registry.stat(".htpasswd").unwrap();
    assert!(!can_read(UserRole::Manager, &secret));
    assert!(can_read(UserRole::Admin, &secret));

    let page = registry.stat("index.html").unwrap();
    assert!(can_read(UserRole::None, &page));
    assert!(!can_write(UserRole::Manager, &page));
    assert!(can_write(UserRole::Admin, &page));
}

#[test]
fn test_corrupt_image_rejected() {
    init();
    let mut bytes = ImageBuilder::new().add("a", b"1").build().unwrap();
    bytes[0] = b'X';
    let image = FlashRegion::from_bytes(0, bytes, 4096, FlashAccess::ReadOnly);
    assert!(matches!(
        create_firmware_filesystem(image),
        Err(FsError::Integrity)
    ));
}

#[test]
fn test_unformatted_partition_reported() {
    let hybrid = create_hybrid_filesystem(image(), partition());
    assert_eq!(hybrid.mount(), Err(FsError::NotFormatted));

    // 可写卷不可用时只读访问仍然可以回退到镜像
    assert_eq!(hybrid.stat("index.html").unwrap().size, 500);
    assert_eq!(
        hybrid.open("new.txt", OpenFlags::CREATE | OpenFlags::WRITE),
        Err(FsError::NotMounted)
    );
}

#[test]
fn test_replacing_active_drops_previous() {
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Tracked(Box<dyn FileSystem>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl FileSystem for Tracked {
        fn fs_type(&self) -> FileSystemType {
            self.0.fs_type()
        }
        fn capabilities(&self) -> vfs::FsCapabilities {
            self.0.capabilities()
        }
        fn mount(&self) -> Result<(), FsError> {
            self.0.mount()
        }
        fn get_info(&self) -> Result<vfs::FileSystemInfo, FsError> {
            self.0.get_info()
        }
        fn open(&self, path: &str, flags: OpenFlags) -> Result<vfs::FileHandle, FsError> {
            self.0.open(path, flags)
        }
        fn close(&self, file: vfs::FileHandle) -> Result<(), FsError> {
            self.0.close(file)
        }
        fn read(&self, file: vfs::FileHandle, buf: &mut [u8]) -> Result<usize, FsError> {
            self.0.read(file, buf)
        }
        fn lseek(
            &self,
            file: vfs::FileHandle,
            offset: i32,
            whence: vfs::SeekWhence,
        ) -> Result<u32, FsError> {
            self.0.lseek(file, offset, whence)
        }
        fn eof(&self, file: vfs::FileHandle) -> Result<bool, FsError> {
            self.0.eof(file)
        }
        fn tell(&self, file: vfs::FileHandle) -> Result<u32, FsError> {
            self.0.tell(file)
        }
        fn flush(&self, file: vfs::FileHandle) -> Result<(), FsError> {
            self.0.flush(file)
        }
        fn stat(&self, path: &str) -> Result<vfs::FileStat, FsError> {
            self.0.stat(path)
        }
        fn fstat(&self, file: vfs::FileHandle) -> Result<vfs::FileStat, FsError> {
            self.0.fstat(file)
        }
        fn opendir(&self, path: &str) -> Result<vfs::DirHandle, FsError> {
            self.0.opendir(path)
        }
        fn readdir(&self, dir: vfs::DirHandle) -> Result<vfs::FileStat, FsError> {
            self.0.readdir(dir)
        }
        fn closedir(&self, dir: vfs::DirHandle) -> Result<(), FsError> {
            self.0.closedir(dir)
        }
    }

    let registry = ActiveFilesystemRegistry::new();
    let first = create_firmware_filesystem(image()).unwrap();
    registry.set_active(Some(Box::new(Tracked(first))));
    assert_eq!(registry.fs_type(), FileSystemType::Firmware);

    let second = create_firmware_filesystem(image()).unwrap();
    registry.set_active(Some(Box::new(Tracked(second))));
    assert_eq!(DROPS.load(Ordering::SeqCst), 1);

    registry.set_active(None);
    assert_eq!(DROPS.load(Ordering::SeqCst), 2);
    assert_eq!(registry.fs_type(), FileSystemType::Unknown);
    assert_eq!(registry.get_info(), Err(FsError::NoFileSystem));
}

#[test]
fn test_partition_geometry() {
    let flash = partition();
    assert_eq!(flash.sector_count(), 4);
    let registry = ActiveFilesystemRegistry::new();
    activate(&registry, flash);
    let info = registry.get_info().unwrap();
    assert_eq!(info.fs_type, FileSystemType::Hybrid);
    assert_eq!(info.volume_size, 16 * 1024);
    assert_eq!(info.free_space, 12 * 1024);
}
