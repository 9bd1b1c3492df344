use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use console::style;
use playlist_core::auth::DevicePromptCallback;
use playlist_core::config::{PartialAuth, PartialCategories};
use playlist_core::{
    dump_categories_blocking, export_playlists_blocking, CollectEvent, Configuration, Conventions,
    DeviceCode, DumpResult, EventCallback, ExportOptions, ExportProgress, ExportResult,
    ExportTarget, PartialConfiguration, ProgressCallback, DEFAULT_CONCURRENCY, FIELDNAMES,
};
use tracing_subscriber::EnvFilter;

const PROGRESS_STEP: u64 = 50;

#[derive(Parser, Debug)]
#[command(author, version, about = "导出YouTube播放列表中的视频到CSV", long_about = None)]
struct Cli {
    /// 输出CSV路径
    #[arg(short = 'o', long = "output", default_value = "myti.csv")]
    output: PathBuf,

    /// 最多抓取的条目数，0 表示不限
    #[arg(short = 'm', long = "max", default_value_t = 0)]
    max: u64,

    /// 输出到标准输出而不是文件
    #[arg(long = "stdout")]
    stdout: bool,

    /// 覆盖已存在的输出文件
    #[arg(long = "force")]
    force: bool,

    /// 只把账号下的播放列表合并写入分类文件
    #[arg(long = "dump-categories")]
    dump_categories: bool,

    /// 用分类名称代替播放列表ID
    #[arg(long = "labels")]
    labels: bool,

    /// 输出文件编码
    #[arg(short = 'e', long = "encoding", default_value = "utf-8")]
    encoding: String,

    /// 同时抓取的播放列表数
    #[arg(long = "concurrency", default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// 请求超时时间（秒）
    #[arg(long = "timeout", default_value_t = 30)]
    timeout: u64,

    /// OAuth client id
    #[arg(long = "client-id")]
    client_id: Option<String>,

    /// OAuth client secret
    #[arg(long = "client-secret")]
    client_secret: Option<String>,

    /// 令牌文件路径
    #[arg(long = "token-file")]
    token_file: Option<PathBuf>,

    /// 分类文件路径
    #[arg(long = "categories-file")]
    categories_file: Option<PathBuf>,

    /// 自定义配置目录
    #[arg(long = "config-dir")]
    config_dir: Option<PathBuf>,

    /// 打印每个播放列表的开始与结束
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();
    if cli.concurrency == 0 {
        bail!("concurrency 必须大于 0");
    }

    if !cli.dump_categories && !cli.stdout && cli.output.exists() && !cli.force {
        eprintln!(
            "{} {} 已存在，使用 --force 覆盖。",
            style("输出文件").red(),
            cli.output.display()
        );
        process::exit(1);
    }

    let configuration = load_configuration(&cli)?;
    let target = if cli.stdout {
        ExportTarget::Stdout
    } else {
        ExportTarget::File(cli.output.clone())
    };

    let mut options = ExportOptions::new(configuration, target);
    options.encoding = cli.encoding.clone();
    options.max_items = cli.max;
    options.concurrency = cli.concurrency;
    options.timeout_secs = cli.timeout;
    options.resolve_labels = cli.labels;
    options.device_prompt = Some(device_prompt());

    if cli.dump_categories {
        let result = dump_categories_blocking(options).with_context(|| "写入分类文件失败")?;
        print_dump_summary(&result);
        return Ok(());
    }

    options.progress_callback = Some(progress_printer());
    if cli.verbose {
        options.event_callback = Some(event_printer());
    }

    let limit = if cli.max > 0 {
        cli.max.to_string()
    } else {
        "全部".to_string()
    };
    eprintln!("{}", style(format!("正在抓取{limit}播放列表条目...")).cyan());

    let result = export_playlists_blocking(options).with_context(|| "导出播放列表失败")?;
    print_summary(&result);
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("初始化日志失败: {err}"))
}

fn load_configuration(cli: &Cli) -> Result<Configuration> {
    let mut conventions = Conventions::default();
    if let Some(dir) = &cli.config_dir {
        conventions.config_dir = dir.clone();
    }
    let overrides = PartialConfiguration {
        auth: PartialAuth {
            client_id: cli.client_id.clone(),
            client_secret: cli.client_secret.clone(),
            token_file: cli.token_file.clone(),
        },
        categories: PartialCategories {
            file: cli.categories_file.clone(),
        },
    };
    Configuration::load(overrides, conventions).with_context(|| "读取配置失败")
}

fn progress_printer() -> ProgressCallback {
    Arc::new(|progress: ExportProgress| {
        if progress.current % PROGRESS_STEP == 0 {
            eprintln!("已抓取 {}...", progress.current);
        }
    })
}

fn event_printer() -> EventCallback {
    Arc::new(|event: &CollectEvent| match event {
        CollectEvent::PlaylistStart(id) => eprintln!("{} {id}", style("开始").dim()),
        CollectEvent::PlaylistComplete(id) => eprintln!("{} {id}", style("完成").green()),
        CollectEvent::PlaylistAbort(id) => eprintln!("{} {id}", style("中止").yellow()),
        _ => {}
    })
}

fn device_prompt() -> DevicePromptCallback {
    Arc::new(|device: &DeviceCode| {
        eprintln!(
            "{} {}",
            style("请在浏览器中打开:").cyan(),
            device.verification_url
        );
        eprintln!("{} {}", style("并输入授权码:").cyan(), device.user_code);
    })
}

fn print_summary(result: &ExportResult) {
    eprintln!(
        "\n{} {} 个视频（处理 {} 条，用时 {:.1}s）",
        style("共提取").green().bold(),
        result.video_count,
        result.processed_count,
        result.elapsed.as_secs_f64()
    );
    if result.cancelled {
        eprintln!("{}", style("已达到条目上限，提前结束抓取。").yellow());
    }
    if let ExportTarget::File(path) = &result.target {
        eprintln!("{} {}", style("已保存到").green(), path.display());
    }
    eprintln!("{} {}", style("CSV表头包含：").dim(), FIELDNAMES.join(", "));
}

fn print_dump_summary(result: &DumpResult) {
    eprintln!(
        "{} {} 个分类（新增 {}），文件：{}",
        style("已写入").green(),
        result.total,
        result.added,
        result.path.display()
    );
}
