use http::{Method, StatusCode};
use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use crate::Error;

pub struct Client {
    client:   HttpClient,
    url:      String,
    username: Option<String>,
    password: Option<String>,
}

impl Client {
    pub fn new(url: &str, username: Option<String>, password: Option<String>) -> Self {
        Self {
            client:   HttpClient::new(),
            url:      url.trim_end_matches('/').to_owned(),
            username: username,
            password: password,
        }
    }

    pub async fn index(&self, index: &str, doc_type: &str, id: &str, params: &[(&str, &str)], body: &Value) -> Result<Value, Error> {
        let path = match id.is_empty() {
            true  => format!("/{}/{}", index, doc_type),
            false => format!("/{}/{}/{}", index, doc_type, id),
        };

        let request  = self.request(Method::POST, &path).query(params).json(body);
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    pub async fn bulk(&self, body: String) -> Result<Value, Error> {
        let request = self.request(Method::POST, "/_bulk")
            .header("Content-Type", "application/x-ndjson")
            .body(body);
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    pub async fn search_uri(&self, index: &str, doc_type: &str) -> Result<SearchResult, Error> {
        let path     = format!("/{}/{}/_search", index, doc_type);
        let request  = self.request(Method::GET, &path);
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    pub async fn create_index(&self, index: &str) -> Result<Value, Error> {
        let path     = format!("/{}", index);
        let request  = self.request(Method::PUT, &path);
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    pub async fn send(&self, request: RequestBuilder) -> Result<Response, Error> {
        let response = request.send().await?;
        let status   = response.status();
        match status {
            _ if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED => Err(Error::Auth),
            _                        => Err(error(response).await?),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.url, path);
        let req = self.client.request(method, &url);
        match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_deref()),
            None       => req,
        }
    }
}

async fn error(response: Response) -> Result<Error, Error> {
    let status = response.status();

    #[derive(Deserialize)]
    struct Wrapper {
        error: Value,
    }

    Ok(match response.json::<Wrapper>().await {
        Ok(w)  => Error::App(w.error.to_string(), status.into()),
        Err(_) => Error::Status(status.into()),
    })
}

#[derive(Debug, Deserialize)]
pub struct SearchResult {
    pub hits: Hits,
}

#[derive(Debug, Deserialize)]
pub struct Hits {
    pub hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
pub struct Hit {
    #[serde(rename = "_source")]
    pub source: Value,
}
