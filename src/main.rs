use cowfs::{metadata, CowFs, Error, Fd, FileMode};

const DISK_CAPACITY: u64 = 10 * 1024 * 1024;

fn section(title: &str) {
    println!();
    println!("{}", "=".repeat(72));
    println!("  {title}");
    println!("{}", "=".repeat(72));
}

fn print_content(fs: &mut CowFs, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let fd = fs.open(name, FileMode::Read)?;
    let size = fs.get_file_size(fd)?;
    let mut buffer = vec![0u8; size as usize];
    let read = fs.read(fd, &mut buffer)?;
    fs.close(fd)?;
    println!("Content of {name} ({read} bytes):");
    println!("{}", String::from_utf8_lossy(&buffer[..read]));
    Ok(())
}

fn print_versions(fs: &CowFs, fd: Fd) -> Result<(), Box<dyn std::error::Error>> {
    for version in fs.get_version_history(fd)? {
        println!("  {version}");
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let disk = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "cowfs_disk.dat".to_owned());

    section("ENGINE INITIALIZATION");
    let mut fs = CowFs::open_disk(&disk, DISK_CAPACITY)?;
    println!("Engine ready, using {} bytes", fs.total_memory_usage());

    section("CREATE, WRITE, READ");
    let fd = match fs.create("document.txt") {
        Ok(fd) => fd,
        Err(Error::AlreadyExists) => fs.open("document.txt", FileMode::Write)?,
        Err(e) => return Err(e.into()),
    };
    fs.write(fd, b"This is the initial content of the document.")?;
    fs.write(fd, b"\nA second revision appends this line.")?;
    fs.write(fd, b"\nAnd a third one finishes it.")?;
    print_content(&mut fs, "document.txt")?;
    print_versions(&fs, fd)?;
    fs.close(fd)?;

    section("ROLLBACK");
    let fd = fs.open("document.txt", FileMode::Write)?;
    fs.rollback_to_version(fd, 1)?;
    print_content(&mut fs, "document.txt")?;
    print_versions(&fs, fd)?;
    fs.close(fd)?;

    section("GARBAGE COLLECTION");
    println!("Memory before: {} bytes", fs.total_memory_usage());
    fs.garbage_collect();
    println!("Memory after:  {} bytes", fs.total_memory_usage());

    section("MULTIPLE FILES");
    for index in 1..=5 {
        let name = format!("file{index}.txt");
        match fs.create(&name) {
            Ok(fd) => {
                fs.write(fd, format!("Content of file {index}").as_bytes())?;
                fs.close(fd)?;
            }
            Err(e) => eprintln!("{name}: {e}"),
        }
    }
    for name in fs.list_files() {
        println!(" - {name}");
    }

    section("METADATA");
    metadata::save(&mut fs, "final")?;
    println!["{}", metadata::render(&mut fs)?];

    fs.shutdown()?;
    Ok(())
}
