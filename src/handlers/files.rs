use std::io;

use actix_multipart::form::{tempfile::TempFile, MultipartForm};
use actix_web::{
    body::SizedStream,
    http::{
        header::{Charset, ContentDisposition, DispositionParam, DispositionType, ExtendedValue},
        Method,
    },
    web, HttpRequest, HttpResponse,
};
use futures_util::{stream, StreamExt};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tokio_util::io::ReaderStream;

use crate::config::Config;
use crate::error::StorageError;
use crate::models::UploadFileResponse;
use crate::services::storage::FileStorage;
use crate::utils::content_type;

pub const BASE_PATH: &str = "/api/files";
pub const DOWNLOAD_PATH: &str = "/api/files/download/";

/// Characters that cannot appear raw in a single path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(MultipartForm)]
pub struct UploadForm {
    #[multipart(rename = "file")]
    file: TempFile,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope(BASE_PATH)
            .route("/upload", web::post().to(upload_file))
            .service(
                // greedy: stored names may contain dots
                web::resource("/download/{file_name:.+}")
                    .route(web::get().to(download_file))
                    .route(web::head().to(download_file)),
            ),
    );
}

pub async fn upload_file(
    req: HttpRequest,
    config: web::Data<Config>,
    storage: web::Data<FileStorage>,
    MultipartForm(form): MultipartForm<UploadForm>,
) -> Result<HttpResponse, StorageError> {
    let upload = form.file;
    let original_name = upload.file_name.clone().unwrap_or_default();
    let file_type = upload.content_type.as_ref().map(|mime| mime.to_string());

    // the multipart extractor has already spooled the part to a temp file
    let reader = tokio::fs::File::open(upload.file.path())
        .await
        .map_err(|e| StorageError::failure(&original_name, e))?;
    let stored_name = storage.store(&original_name, reader).await?;

    let file_download_uri = download_uri(&req, config.public_url.as_deref(), &stored_name);

    Ok(HttpResponse::Ok().json(UploadFileResponse::new(
        stored_name,
        file_download_uri,
        file_type,
        upload.size as u64,
    )))
}

pub async fn download_file(
    path: web::Path<String>,
    method: Method,
    storage: web::Data<FileStorage>,
) -> Result<HttpResponse, StorageError> {
    let file_name = path.into_inner();
    let stored = storage.load(&file_name).await?;

    let mime = content_type::resolve(&stored.path);
    let disposition = attachment(stored.name);
    let size = stored.size;

    let stream = match method {
        // empty stream for HEAD requests
        Method::HEAD => stream::empty::<Result<_, io::Error>>().boxed_local(),
        _ => ReaderStream::new(stored.file).boxed_local(),
    };

    Ok(HttpResponse::Ok()
        .content_type(mime)
        .insert_header(disposition)
        .no_chunking(size)
        .body(SizedStream::new(size, stream)))
}

/// Non-ASCII names also get an RFC 5987 `filename*` parameter.
fn attachment(file_name: String) -> ContentDisposition {
    let mut parameters = vec![DispositionParam::Filename(file_name.clone())];
    if !file_name.is_ascii() {
        parameters.push(DispositionParam::FilenameExt(ExtendedValue {
            charset: Charset::Ext(String::from("UTF-8")),
            language_tag: None,
            value: file_name.into_bytes(),
        }));
    }

    ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters,
    }
}

fn download_uri(req: &HttpRequest, public_url: Option<&str>, file_name: &str) -> String {
    let file_name = utf8_percent_encode(file_name, PATH_SEGMENT);
    match public_url {
        Some(base) => format!("{base}{DOWNLOAD_PATH}{file_name}"),
        None => {
            let info = req.connection_info();
            format!(
                "{}://{}{DOWNLOAD_PATH}{file_name}",
                info.scheme(),
                info.host()
            )
        }
    }
}
